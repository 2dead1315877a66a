//! The copier: runs one node's rule set and recursively copies reachable nodes

use std::fmt;
use std::sync::Arc;

use crate::error::{CopyError, Result};
use crate::host::{FieldAccessible, Host, NodeSpace};
use crate::identity::{IdentityTable, Lookup};
use crate::options::CopyOptions;
use crate::registry::{CopierHandle, DeepPolicy, Registry};
use crate::rules::TargetBuild;
use crate::model::Namespace;

/// Read-only context shared by every copier of a session.
pub struct Scope<'a, H: Host> {
    pub host: &'a H,
    pub registry: &'a Registry<H>,
    pub options: &'a CopyOptions,
}

impl<H: Host> Clone for Scope<'_, H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H: Host> Copy for Scope<'_, H> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopierState {
    /// Constructed, rules not yet run.
    Pending,
    /// Every rule ran; the target is final.
    Complete,
}

/// Copies one source node into one target node.
///
/// Construction registers `source -> target` in the session's identity table
/// before any rule runs, so edges that lead back to this source (cycles)
/// resolve to the same target instead of recursing.
pub struct Copier<'a, H: Host> {
    scope: Scope<'a, H>,
    table: &'a mut IdentityTable<H::Node>,
    copier: CopierHandle<H>,
    source: H::Node,
    target: H::Node,
    depth: usize,
    state: CopierState,
}

impl<'a, H: Host> Copier<'a, H> {
    /// A root copier. `target` defaults to an empty node of the source's type;
    /// the identity copier always uses the source itself.
    pub fn new(
        scope: Scope<'a, H>,
        table: &'a mut IdentityTable<H::Node>,
        copier: CopierHandle<H>,
        source: H::Node,
        target: Option<H::Node>,
    ) -> Result<Self> {
        Self::at_depth(scope, table, copier, source, target, 0)
    }

    fn at_depth(
        scope: Scope<'a, H>,
        table: &'a mut IdentityTable<H::Node>,
        copier: CopierHandle<H>,
        source: H::Node,
        target: Option<H::Node>,
        depth: usize,
    ) -> Result<Self> {
        let target = match target {
            _ if copier.is_identity() => source.clone(),
            Some(target) => target,
            None => scope.host.construct_empty(&source)?,
        };
        table.add(scope.host.identity(&source), target.clone())?;
        Ok(Copier {
            scope,
            table,
            copier,
            source,
            target,
            depth,
            state: CopierState::Pending,
        })
    }

    /// Run every rule in order and return the target.
    ///
    /// Calling `copy` again re-runs all rules against the same target; whether
    /// that is harmless depends on the rules. A failing rule stops the copy and
    /// leaves the target as populated so far.
    pub fn copy(&mut self) -> Result<H::Node> {
        if self.state == CopierState::Complete {
            tracing::warn!("re-running copier {} on an already copied target", self.copier.name());
        }
        let copier = Arc::clone(&self.copier);
        if let Some(rules) = copier.rules() {
            tracing::debug!(
                copier = %copier.qualified_name(),
                depth = self.depth,
                "copying {:?}",
                self.source
            );
            for rule in rules.iter() {
                tracing::trace!("{}: {}", copier.name(), rule.describe());
                rule.apply(self)?;
            }
        }
        self.state = CopierState::Complete;
        Ok(self.target.clone())
    }

    /// Copy `child` (if present) with the copier selected by `policy`, or
    /// return the target it already has in this session.
    ///
    /// On a miss the initial target comes from `build` (identity copies use
    /// the child itself), is registered, and a nested copier runs on it.
    pub fn deep_copy(
        &mut self,
        child: Option<&H::Node>,
        policy: &DeepPolicy<H>,
        namespace: Option<&Namespace>,
        build: &TargetBuild<H>,
    ) -> Result<Option<H::Node>> {
        let Some(child) = child else {
            return Ok(None);
        };

        let scope = self.scope;
        let host = scope.host;
        let copier = match policy {
            DeepPolicy::Shallow => scope.registry.identity(),
            DeepPolicy::Copier(reference) => scope.registry.resolve_explicit(reference, namespace)?,
            DeepPolicy::Polymorphic => {
                scope.registry.resolve_polymorphic(&host.type_tag(child), namespace)?
            }
        };

        let key = host.identity(child);
        let depth = self.depth + 1;
        let limit = scope.options.max_depth;
        let parent = &self.target;
        let lookup = self.table.lookup_or_insert(key, || {
            if copier.is_identity() {
                return Ok(child.clone());
            }
            if depth > limit {
                return Err(CopyError::DepthExceeded { limit });
            }
            match build {
                TargetBuild::Default => host.construct_empty(child),
                TargetBuild::Related(relation) => {
                    let subtype = policy.is_polymorphic().then(|| host.type_tag(child));
                    host.build_related(parent, relation, subtype.as_deref())
                }
                TargetBuild::With(builder) => builder(host, parent, child),
            }
        })?;

        match lookup {
            Lookup::Hit(target) => {
                tracing::trace!("{} already copied, reusing its target", key);
                Ok(Some(target))
            }
            Lookup::Inserted(target) => {
                if copier.is_identity() {
                    return Ok(Some(target));
                }
                let mut nested =
                    Copier::at_depth(scope, &mut *self.table, copier, child.clone(), Some(target), depth)?;
                nested.copy().map(Some)
            }
        }
    }

    /// Share `child` by reference: its target is the child itself.
    pub fn shallow_copy(&mut self, child: Option<&H::Node>) -> Result<Option<H::Node>> {
        self.deep_copy(child, &DeepPolicy::Shallow, None, &TargetBuild::Default)
    }

    pub fn source(&self) -> &H::Node {
        &self.source
    }

    pub fn target(&self) -> &H::Node {
        &self.target
    }

    pub fn host(&self) -> &'a H {
        self.scope.host
    }

    pub fn registry(&self) -> &'a Registry<H> {
        self.scope.registry
    }

    pub fn copier_name(&self) -> &str {
        self.copier.name()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn state(&self) -> CopierState {
        self.state
    }

    /// Distinct sources registered in this session so far.
    pub fn copied_count(&self) -> usize {
        self.table.count()
    }

    /// Read `field` from the source.
    pub fn source_field(&self, field: &str) -> Result<<H as FieldAccessible>::Value> {
        self.host().read_field(&self.source, field)
    }

    /// Write `value` into the target's `field`.
    pub fn set_target_field(&self, field: &str, value: <H as FieldAccessible>::Value) -> Result<()> {
        self.host().write_field(&self.target, field, value)
    }

    /// Runtime type of the source.
    pub fn source_type(&self) -> String {
        <H as NodeSpace>::type_tag(self.host(), &self.source)
    }
}

impl<H: Host> fmt::Debug for Copier<'_, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Copier")
            .field("copier", &self.copier.qualified_name())
            .field("source", &self.source)
            .field("target", &self.target)
            .field("depth", &self.depth)
            .field("state", &self.state)
            .finish()
    }
}
