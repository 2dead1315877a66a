//! Declarative copy rules and the ordered rule sets built from them

use std::fmt;
use std::sync::Arc;

use crate::copier::Copier;
use crate::error::{CopyError, Result};
use crate::host::{FieldAccessible, Host, NodeSpace};
use crate::model::{CollectionMode, CommitMode, Namespace};
use crate::registry::DeepPolicy;

type Node<H> = <H as NodeSpace>::Node;
type Value<H> = <H as FieldAccessible>::Value;

/// Arbitrary action run against a copier's source and target.
pub type CustomAction<H> =
    Arc<dyn Fn(&mut Copier<'_, H>) -> anyhow::Result<()> + Send + Sync>;

/// Builds the initial target for a nested copy from
/// `(host, parent target, child source)`.
pub type TargetBuilder<H> =
    Arc<dyn Fn(&H, &Node<H>, &Node<H>) -> Result<Node<H>> + Send + Sync>;

/// How the initial target of a nested copy is constructed on a table miss.
pub enum TargetBuild<H: Host> {
    /// An empty node of the child source's own runtime type.
    Default,
    /// Ask the host to build a related node for this relation of the parent target.
    Related(String),
    /// A caller-supplied constructor.
    With(TargetBuilder<H>),
}

impl<H: Host> Clone for TargetBuild<H> {
    fn clone(&self) -> Self {
        match self {
            TargetBuild::Default => TargetBuild::Default,
            TargetBuild::Related(relation) => TargetBuild::Related(relation.clone()),
            TargetBuild::With(builder) => TargetBuild::With(Arc::clone(builder)),
        }
    }
}

impl<H: Host> fmt::Debug for TargetBuild<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetBuild::Default => f.write_str("Default"),
            TargetBuild::Related(relation) => write!(f, "Related({relation})"),
            TargetBuild::With(_) => f.write_str("With(..)"),
        }
    }
}

/// Configuration of a reference or collection edge.
pub struct EdgeRule<H: Host> {
    pub relation: String,
    pub policy: DeepPolicy<H>,
    pub namespace: Option<Namespace>,
    pub build: TargetBuild<H>,
}

impl<H: Host> EdgeRule<H> {
    /// A shallow edge whose nested targets are built through the relation.
    pub fn new(relation: impl Into<String>) -> Self {
        let relation = relation.into();
        EdgeRule {
            build: TargetBuild::Related(relation.clone()),
            relation,
            policy: DeepPolicy::Shallow,
            namespace: None,
        }
    }

    pub fn deep(mut self, policy: DeepPolicy<H>) -> Self {
        self.policy = policy;
        self
    }

    pub fn polymorphic(self) -> Self {
        self.deep(DeepPolicy::Polymorphic)
    }

    pub fn in_namespace(mut self, namespace: impl Into<Namespace>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Build nested targets as empty nodes of the source's type instead of
    /// going through the relation.
    pub fn build_default(mut self) -> Self {
        self.build = TargetBuild::Default;
        self
    }

    pub fn build_with<F>(mut self, builder: F) -> Self
    where
        F: Fn(&H, &Node<H>, &Node<H>) -> Result<Node<H>> + Send + Sync + 'static,
    {
        self.build = TargetBuild::With(Arc::new(builder));
        self
    }
}

impl<H: Host> fmt::Debug for EdgeRule<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeRule")
            .field("relation", &self.relation)
            .field("policy", &self.policy)
            .field("namespace", &self.namespace)
            .field("build", &self.build)
            .finish()
    }
}

/// One unit of copy behaviour.
pub enum CopyRule<H: Host> {
    Custom(CustomAction<H>),
    /// Copy the named scalar fields unchanged.
    Fields(Vec<String>),
    /// Write a fixed value into a target field.
    Set { field: String, value: Value<H> },
    Reference(EdgeRule<H>),
    Collection { edge: EdgeRule<H>, mode: CollectionMode },
    Commit(CommitMode),
}

impl<H: Host> CopyRule<H> {
    /// Run the rule against `copier`'s source and target.
    pub fn apply(&self, copier: &mut Copier<'_, H>) -> Result<()> {
        let host = copier.host();
        match self {
            CopyRule::Custom(action) => {
                let outcome = action(copier);
                outcome.map_err(|error| CopyError::from_custom(copier.copier_name(), error))
            }
            CopyRule::Fields(fields) => {
                for field in fields {
                    let value = host.read_field(copier.source(), field)?;
                    host.write_field(copier.target(), field, value)?;
                }
                Ok(())
            }
            CopyRule::Set { field, value } => host.write_field(copier.target(), field, value.clone()),
            CopyRule::Reference(edge) => {
                let related = host.read_reference(copier.source(), &edge.relation)?;
                let copied =
                    copier.deep_copy(related.as_ref(), &edge.policy, edge.namespace.as_ref(), &edge.build)?;
                host.write_reference(copier.target(), &edge.relation, copied)
            }
            CopyRule::Collection { edge, mode } => {
                let members = host.read_collection(copier.source(), &edge.relation)?;
                let mut copied = Vec::with_capacity(members.len());
                for member in &members {
                    let target = copier.deep_copy(
                        Some(member),
                        &edge.policy,
                        edge.namespace.as_ref(),
                        &edge.build,
                    )?;
                    let Some(target) = target else { continue };
                    match mode {
                        CollectionMode::Append => {
                            host.append_to_collection(copier.target(), &edge.relation, target)?
                        }
                        CollectionMode::Replace => copied.push(target),
                    }
                }
                if *mode == CollectionMode::Replace {
                    host.replace_collection(copier.target(), &edge.relation, copied)?;
                }
                Ok(())
            }
            CopyRule::Commit(mode) => host.commit(copier.target(), *mode),
        }
    }

    /// Short label for logs.
    pub fn describe(&self) -> String {
        match self {
            CopyRule::Custom(_) => "custom".to_string(),
            CopyRule::Fields(fields) => format!("fields({})", fields.join(", ")),
            CopyRule::Set { field, .. } => format!("set({field})"),
            CopyRule::Reference(edge) => format!("reference({}, {:?})", edge.relation, edge.policy),
            CopyRule::Collection { edge, mode } => {
                format!("collection({}, {:?}, {:?})", edge.relation, edge.policy, mode)
            }
            CopyRule::Commit(mode) => format!("commit({mode:?})"),
        }
    }
}

impl<H: Host> fmt::Debug for CopyRule<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Ordered rules for one copier type. Order is execution order.
pub struct CopyRuleSet<H: Host> {
    rules: Vec<CopyRule<H>>,
}

impl<H: Host> CopyRuleSet<H> {
    pub fn builder() -> RuleSetBuilder<H> {
        RuleSetBuilder { rules: Vec::new() }
    }

    pub fn empty() -> Self {
        CopyRuleSet { rules: Vec::new() }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CopyRule<H>> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<H: Host> From<Vec<CopyRule<H>>> for CopyRuleSet<H> {
    fn from(rules: Vec<CopyRule<H>>) -> Self {
        CopyRuleSet { rules }
    }
}

impl<H: Host> fmt::Debug for CopyRuleSet<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.rules.iter()).finish()
    }
}

/// Fluent builder for a [`CopyRuleSet`]; rules run in the order they are added.
pub struct RuleSetBuilder<H: Host> {
    rules: Vec<CopyRule<H>>,
}

impl<H: Host> RuleSetBuilder<H> {
    pub fn rule(mut self, rule: CopyRule<H>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn custom<F>(self, action: F) -> Self
    where
        F: Fn(&mut Copier<'_, H>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.rule(CopyRule::Custom(Arc::new(action)))
    }

    pub fn fields<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rule(CopyRule::Fields(fields.into_iter().map(Into::into).collect()))
    }

    pub fn set(self, field: impl Into<String>, value: Value<H>) -> Self {
        self.rule(CopyRule::Set {
            field: field.into(),
            value,
        })
    }

    pub fn reference(self, relation: impl Into<String>, policy: DeepPolicy<H>) -> Self {
        self.reference_with(EdgeRule::new(relation).deep(policy))
    }

    pub fn reference_with(self, edge: EdgeRule<H>) -> Self {
        self.rule(CopyRule::Reference(edge))
    }

    /// Collection edge appending onto the target's existing members.
    pub fn collection(self, relation: impl Into<String>, policy: DeepPolicy<H>) -> Self {
        self.collection_with(EdgeRule::new(relation).deep(policy), CollectionMode::Append)
    }

    pub fn collection_with(self, edge: EdgeRule<H>, mode: CollectionMode) -> Self {
        self.rule(CopyRule::Collection { edge, mode })
    }

    pub fn commit(self) -> Self {
        self.rule(CopyRule::Commit(CommitMode::Validated))
    }

    pub fn commit_without_validation(self) -> Self {
        self.rule(CopyRule::Commit(CommitMode::SkipValidation))
    }

    pub fn build(self) -> CopyRuleSet<H> {
        CopyRuleSet { rules: self.rules }
    }
}
