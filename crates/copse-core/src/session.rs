//! Copy sessions: one identity table, one host, one registry

use std::time::{Duration, Instant};

use crate::copier::{Copier, Scope};
use crate::error::Result;
use crate::host::{Host, NodeSpace};
use crate::identity::IdentityTable;
use crate::model::Namespace;
use crate::options::CopyOptions;
use crate::registry::{CopierRef, Registry};

/// Summary of one root copy.
#[derive(Debug, Clone)]
pub struct CopyReport<N> {
    pub target: N,
    /// Sources newly registered by this copy.
    pub visited: usize,
    /// Sources registered in the session overall.
    pub session_total: usize,
    pub elapsed: Duration,
}

/// Owns the identity table for a sequence of root copies.
///
/// Copying several roots through one session shares targets between them:
/// a node reachable from two roots is copied once.
pub struct CopySession<'a, H: Host> {
    host: &'a H,
    registry: &'a Registry<H>,
    options: CopyOptions,
    table: IdentityTable<H::Node>,
}

impl<'a, H: Host> CopySession<'a, H> {
    pub fn new(host: &'a H, registry: &'a Registry<H>) -> Self {
        CopySession {
            host,
            registry,
            options: CopyOptions::default(),
            table: IdentityTable::new(),
        }
    }

    pub fn with_options(mut self, options: CopyOptions) -> Self {
        self.options = options;
        self
    }

    /// Continue from an identity table of an earlier session.
    pub fn with_table(mut self, table: IdentityTable<H::Node>) -> Self {
        self.table = table;
        self
    }

    pub fn options(&self) -> &CopyOptions {
        &self.options
    }

    pub fn table(&self) -> &IdentityTable<H::Node> {
        &self.table
    }

    pub fn into_table(self) -> IdentityTable<H::Node> {
        self.table
    }

    /// Copy `source` with the given copier into a fresh target.
    ///
    /// If `source` was already copied in this session its existing target is
    /// returned and no rule runs.
    pub fn copy(&mut self, source: &H::Node, copier: impl Into<CopierRef<H>>) -> Result<H::Node> {
        if let Some(existing) = self.table.get(self.host.identity(source)) {
            return Ok(existing.clone());
        }
        self.run(source, copier.into(), None)
    }

    /// Copy `source` into an explicit, possibly pre-populated, `target`.
    ///
    /// Rules always run. If `source` was already copied in this session to a
    /// different target this fails with [`CopyError::IdentityConflict`](crate::error::CopyError::IdentityConflict).
    pub fn copy_into(
        &mut self,
        source: &H::Node,
        target: H::Node,
        copier: impl Into<CopierRef<H>>,
    ) -> Result<H::Node> {
        self.run(source, copier.into(), Some(target))
    }

    /// Copy `source` with the copier registered for its runtime type.
    pub fn copy_polymorphic(
        &mut self,
        source: &H::Node,
        namespace: Option<&Namespace>,
    ) -> Result<H::Node> {
        let copier = self
            .registry
            .resolve_polymorphic(&self.host.type_tag(source), namespace)?;
        self.copy(source, copier)
    }

    /// Like [`copy`](Self::copy), also reporting how much of the graph was visited.
    pub fn copy_with_report(
        &mut self,
        source: &H::Node,
        copier: impl Into<CopierRef<H>>,
    ) -> Result<CopyReport<H::Node>> {
        let started = Instant::now();
        let before = self.table.count();
        let target = self.copy(source, copier)?;
        let session_total = self.table.count();
        Ok(CopyReport {
            target,
            visited: session_total - before,
            session_total,
            elapsed: started.elapsed(),
        })
    }

    fn run(
        &mut self,
        source: &H::Node,
        copier: CopierRef<H>,
        target: Option<H::Node>,
    ) -> Result<H::Node> {
        let copier = self.registry.resolve_explicit(&copier, None)?;
        let scope = Scope {
            host: self.host,
            registry: self.registry,
            options: &self.options,
        };
        tracing::debug!(
            "copy session: {} over {:?} ({} sources known)",
            copier.qualified_name(),
            source,
            self.table.count()
        );
        let mut root = Copier::new(scope, &mut self.table, copier, source.clone(), target)?;
        root.copy()
    }
}

impl<H: Host> std::fmt::Debug for CopySession<'_, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopySession")
            .field("options", &self.options)
            .field("copied", &self.table.count())
            .finish()
    }
}

/// Copy `source` in a fresh session and return its target.
pub fn copy_graph<H: Host>(
    host: &H,
    registry: &Registry<H>,
    source: &<H as NodeSpace>::Node,
    copier: impl Into<CopierRef<H>>,
) -> Result<<H as NodeSpace>::Node> {
    CopySession::new(host, registry).copy(source, copier)
}
