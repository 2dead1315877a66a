//! Copier types and the registry that resolves them by name or runtime type

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{CopyError, Result};
use crate::host::Host;
use crate::model::Namespace;
use crate::rules::CopyRuleSet;

/// Name under which the identity copier resolves in every namespace.
pub const IDENTITY_COPIER: &str = "IdentityCopier";

/// Suffix used by [`RegistryBuilder::by_convention`]: `ProjectCopier` copies `Project`.
pub const CONVENTION_SUFFIX: &str = "Copier";

/// A named copy policy: either the identity policy or an ordered rule set.
pub struct CopierType<H: Host> {
    name: String,
    namespace: Namespace,
    rules: Option<CopyRuleSet<H>>,
}

/// Shared handle to a registered copier type.
pub type CopierHandle<H> = Arc<CopierType<H>>;

impl<H: Host> CopierType<H> {
    pub fn new(name: impl Into<String>, rules: CopyRuleSet<H>) -> CopierHandle<H> {
        Self::in_namespace(Namespace::root(), name, rules)
    }

    pub fn in_namespace(
        namespace: Namespace,
        name: impl Into<String>,
        rules: CopyRuleSet<H>,
    ) -> CopierHandle<H> {
        Arc::new(CopierType {
            name: name.into(),
            namespace,
            rules: Some(rules),
        })
    }

    /// The copier that copies nothing: the target of a node is the node itself.
    pub fn identity() -> CopierHandle<H> {
        Arc::new(CopierType {
            name: IDENTITY_COPIER.to_string(),
            namespace: Namespace::root(),
            rules: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn qualified_name(&self) -> String {
        self.namespace.qualify(&self.name)
    }

    pub fn is_identity(&self) -> bool {
        self.rules.is_none()
    }

    /// Rule set, `None` for the identity copier.
    pub fn rules(&self) -> Option<&CopyRuleSet<H>> {
        self.rules.as_ref()
    }
}

impl<H: Host> fmt::Debug for CopierType<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopierType")
            .field("name", &self.qualified_name())
            .field("rules", &self.rules.as_ref().map_or(0, |r| r.len()))
            .finish()
    }
}

/// Reference to a copier type, either by (possibly qualified) name or directly.
pub enum CopierRef<H: Host> {
    Name(String),
    Handle(CopierHandle<H>),
}

impl<H: Host> Clone for CopierRef<H> {
    fn clone(&self) -> Self {
        match self {
            CopierRef::Name(name) => CopierRef::Name(name.clone()),
            CopierRef::Handle(handle) => CopierRef::Handle(Arc::clone(handle)),
        }
    }
}

impl<H: Host> fmt::Debug for CopierRef<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopierRef::Name(name) => write!(f, "Name({name})"),
            CopierRef::Handle(handle) => write!(f, "Handle({})", handle.qualified_name()),
        }
    }
}

impl<H: Host> From<&str> for CopierRef<H> {
    fn from(name: &str) -> Self {
        CopierRef::Name(name.to_string())
    }
}

impl<H: Host> From<String> for CopierRef<H> {
    fn from(name: String) -> Self {
        CopierRef::Name(name)
    }
}

impl<H: Host> From<CopierHandle<H>> for CopierRef<H> {
    fn from(handle: CopierHandle<H>) -> Self {
        CopierRef::Handle(handle)
    }
}

/// Which copier an edge uses for the node it points at.
pub enum DeepPolicy<H: Host> {
    /// Share the node by reference (identity copier).
    Shallow,
    /// Copy with a fixed copier type.
    Copier(CopierRef<H>),
    /// Copy with the copier registered for the node's own runtime type.
    Polymorphic,
}

impl<H: Host> DeepPolicy<H> {
    pub fn copier(reference: impl Into<CopierRef<H>>) -> Self {
        DeepPolicy::Copier(reference.into())
    }

    pub fn is_polymorphic(&self) -> bool {
        matches!(self, DeepPolicy::Polymorphic)
    }
}

impl<H: Host> Default for DeepPolicy<H> {
    fn default() -> Self {
        DeepPolicy::Shallow
    }
}

impl<H: Host> Clone for DeepPolicy<H> {
    fn clone(&self) -> Self {
        match self {
            DeepPolicy::Shallow => DeepPolicy::Shallow,
            DeepPolicy::Copier(reference) => DeepPolicy::Copier(reference.clone()),
            DeepPolicy::Polymorphic => DeepPolicy::Polymorphic,
        }
    }
}

impl<H: Host> fmt::Debug for DeepPolicy<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeepPolicy::Shallow => f.write_str("Shallow"),
            DeepPolicy::Copier(reference) => write!(f, "Copier({reference:?})"),
            DeepPolicy::Polymorphic => f.write_str("Polymorphic"),
        }
    }
}

type Scoped<H> = HashMap<Namespace, HashMap<String, CopierHandle<H>>>;

/// Immutable lookup of copier types, built once at setup.
///
/// Names are scoped by namespace; runtime type tags map to copier types per
/// namespace. Lookups never fall back to another namespace.
pub struct Registry<H: Host> {
    copiers: Scoped<H>,
    by_type: Scoped<H>,
    identity: CopierHandle<H>,
}

impl<H: Host> Registry<H> {
    pub fn builder() -> RegistryBuilder<H> {
        RegistryBuilder::new()
    }

    /// A registry that only knows the identity copier.
    pub fn empty() -> Self {
        Registry {
            copiers: HashMap::new(),
            by_type: HashMap::new(),
            identity: CopierType::identity(),
        }
    }

    pub fn identity(&self) -> CopierHandle<H> {
        Arc::clone(&self.identity)
    }

    /// Look up a copier by local name in exactly `namespace`.
    pub fn get(&self, namespace: &Namespace, name: &str) -> Option<CopierHandle<H>> {
        if name == IDENTITY_COPIER {
            return Some(self.identity());
        }
        self.copiers
            .get(namespace)
            .and_then(|scope| scope.get(name))
            .map(Arc::clone)
    }

    /// Resolve an explicit reference. Handles pass through unchanged. Names
    /// resolve in their own qualifier if they have one, else in `namespace`,
    /// else in the root namespace.
    pub fn resolve_explicit(
        &self,
        reference: &CopierRef<H>,
        namespace: Option<&Namespace>,
    ) -> Result<CopierHandle<H>> {
        match reference {
            CopierRef::Handle(handle) => Ok(Arc::clone(handle)),
            CopierRef::Name(name) => {
                let (qualifier, local) = Namespace::split_qualified(name);
                let qualified = qualifier.is_some();
                let scope = qualifier
                    .or_else(|| namespace.cloned())
                    .unwrap_or_default();
                if let Some(handle) = self.get(&scope, local) {
                    return Ok(handle);
                }
                // Unqualified names also see root copiers
                if !qualified && !scope.is_root() {
                    if let Some(handle) = self.get(&Namespace::root(), local) {
                        return Ok(handle);
                    }
                }
                Err(CopyError::unresolved(local, scope))
            }
        }
    }

    /// Copier registered for runtime type `type_tag` in `namespace` (root if
    /// `None`). A missing mapping is an error, never a silent fallback.
    pub fn resolve_polymorphic(
        &self,
        type_tag: &str,
        namespace: Option<&Namespace>,
    ) -> Result<CopierHandle<H>> {
        let scope = namespace.cloned().unwrap_or_default();
        self.by_type
            .get(&scope)
            .and_then(|types| types.get(type_tag))
            .map(Arc::clone)
            .ok_or_else(|| CopyError::unresolved(format!("{type_tag}{CONVENTION_SUFFIX}"), scope))
    }

    /// Number of registered copier types, identity excluded.
    pub fn len(&self) -> usize {
        self.copiers.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Qualified names of all registered copier types, sorted.
    pub fn copier_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .copiers
            .values()
            .flat_map(|scope| scope.values().map(|copier| copier.qualified_name()))
            .collect();
        names.sort();
        names
    }

    /// `(namespace, type tag, copier)` for every runtime-type mapping, sorted.
    pub fn type_mappings(&self) -> Vec<(Namespace, String, String)> {
        let mut mappings: Vec<_> = self
            .by_type
            .iter()
            .flat_map(|(namespace, types)| {
                types.iter().map(move |(tag, copier)| {
                    (namespace.clone(), tag.clone(), copier.qualified_name())
                })
            })
            .collect();
        mappings.sort();
        mappings
    }
}

impl<H: Host> Default for Registry<H> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<H: Host> fmt::Debug for Registry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("copiers", &self.copier_names())
            .field("type_mappings", &self.type_mappings().len())
            .finish()
    }
}

/// Setup-time builder for a [`Registry`].
pub struct RegistryBuilder<H: Host> {
    copiers: Scoped<H>,
    mappings: Vec<(Namespace, String, String)>,
    by_convention: bool,
}

impl<H: Host> RegistryBuilder<H> {
    pub fn new() -> Self {
        RegistryBuilder {
            copiers: HashMap::new(),
            mappings: Vec::new(),
            by_convention: false,
        }
    }

    /// Register a rule set under `name` in the root namespace.
    pub fn copier(self, name: impl Into<String>, rules: CopyRuleSet<H>) -> Self {
        self.handle(CopierType::new(name, rules))
    }

    /// Register a rule set under `name` in `namespace`.
    pub fn copier_in(
        self,
        namespace: impl Into<Namespace>,
        name: impl Into<String>,
        rules: CopyRuleSet<H>,
    ) -> Self {
        self.handle(CopierType::in_namespace(namespace.into(), name, rules))
    }

    /// Register an already built copier type under its own name and namespace.
    pub fn handle(mut self, copier: CopierHandle<H>) -> Self {
        let scope = self.copiers.entry(copier.namespace().clone()).or_default();
        if let Some(previous) = scope.insert(copier.name().to_string(), Arc::clone(&copier)) {
            tracing::warn!("copier {} registered twice, keeping the latest", previous.qualified_name());
        }
        self
    }

    /// Map runtime type `type_tag` to the copier named `copier` (root namespace).
    pub fn for_type(self, type_tag: impl Into<String>, copier: impl Into<String>) -> Self {
        self.for_type_in(Namespace::root(), type_tag, copier)
    }

    /// Map runtime type `type_tag` to the copier named `copier` within `namespace`.
    pub fn for_type_in(
        mut self,
        namespace: impl Into<Namespace>,
        type_tag: impl Into<String>,
        copier: impl Into<String>,
    ) -> Self {
        self.mappings
            .push((namespace.into(), type_tag.into(), copier.into()));
        self
    }

    /// Also map `Foo` to every copier named `FooCopier`, per namespace.
    /// Explicit [`for_type`](Self::for_type) mappings take precedence.
    pub fn by_convention(mut self) -> Self {
        self.by_convention = true;
        self
    }

    /// Freeze the registry. Fails if a type mapping names an unknown copier.
    pub fn build(self) -> Result<Registry<H>> {
        let mut registry = Registry {
            copiers: self.copiers,
            by_type: HashMap::new(),
            identity: CopierType::identity(),
        };

        if self.by_convention {
            let mut derived: Vec<(Namespace, String, CopierHandle<H>)> = Vec::new();
            for (namespace, scope) in &registry.copiers {
                for (name, copier) in scope {
                    if let Some(tag) = name.strip_suffix(CONVENTION_SUFFIX) {
                        if !tag.is_empty() {
                            derived.push((namespace.clone(), tag.to_string(), Arc::clone(copier)));
                        }
                    }
                }
            }
            for (namespace, tag, copier) in derived {
                registry.by_type.entry(namespace).or_default().insert(tag, copier);
            }
        }

        for (namespace, tag, name) in self.mappings {
            let copier = registry.resolve_explicit(&CopierRef::Name(name), Some(&namespace))?;
            registry.by_type.entry(namespace).or_default().insert(tag, copier);
        }

        tracing::debug!(
            "copier registry built: {} copiers, {} type mappings",
            registry.len(),
            registry.type_mappings().len()
        );
        Ok(registry)
    }
}

impl<H: Host> Default for RegistryBuilder<H> {
    fn default() -> Self {
        Self::new()
    }
}
