//! Declarative copy plans (YAML, TOML or JSON) compiled into a copier registry
//!
//! ```yaml
//! root: ProjectCopier
//! by_convention: true
//! copiers:
//!   - name: ProjectCopier
//!     rules:
//!       - fields: [name]
//!       - set: { field: archived, value: false }
//!       - reference: { name: owner }
//!       - collection: { name: todos, polymorphic: true }
//!       - commit: validated
//!   - name: TodoCopier
//!     rules:
//!       - fields: [name]
//! ```

use std::collections::HashSet;
use std::path::Path;

use copse_core::{
    CollectionMode, CommitMode, CopierRef, CopierType, CopyOptions, CopyRule, CopyRuleSet,
    DeepPolicy, EdgeRule, Namespace, Registry, CONVENTION_SUFFIX,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::schema::Schema;
use crate::store::Store;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyPlan {
    /// Copier used for the root when the caller names none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    /// Map `Foo` to every `FooCopier` for polymorphic edges.
    pub by_convention: bool,
    pub options: CopyOptions,
    pub copiers: Vec<CopierPlan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopierPlan {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Runtime type this copier handles in polymorphic lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_type: Option<String>,
    #[serde(default)]
    pub rules: Vec<RulePlan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePlan {
    Fields(Vec<String>),
    Set { field: String, value: Value },
    Reference(EdgePlan),
    Collection(EdgePlan),
    Commit(CommitMode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgePlan {
    pub name: String,
    #[serde(default)]
    pub deep: DeepPlan,
    #[serde(default)]
    pub polymorphic: bool,
    /// Namespace for nested copier lookups; defaults to the copier's own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub build: BuildPlan,
    /// Collections only; falls back to `options.default_collection_mode`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<CollectionMode>,
}

/// `deep: false` (or absent) keeps the edge shallow; `deep: SomeCopier`
/// copies through the named copier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeepPlan {
    Flag(bool),
    Copier(String),
}

impl Default for DeepPlan {
    fn default() -> Self {
        DeepPlan::Flag(false)
    }
}

/// How nested targets are constructed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPlan {
    /// Through the relation of the parent target, pre-linking its inverse.
    #[default]
    Related,
    /// As a free-standing empty record of the source's type.
    Empty,
}

impl CopyPlan {
    /// Rules are single-key maps (`- fields: [name]`), not YAML tags.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let deserializer = serde_yaml::Deserializer::from_str(text);
        Ok(serde_yaml::with::singleton_map_recursive::deserialize(deserializer)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        let mut out = Vec::new();
        let mut serializer = serde_yaml::Serializer::new(&mut out);
        serde_yaml::with::singleton_map_recursive::serialize(self, &mut serializer)?;
        String::from_utf8(out).map_err(|err| StoreError::Plan(err.to_string()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let plan = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&text)?,
            Some("toml") => Self::from_toml(&text)?,
            Some("json") => serde_json::from_str(&text)?,
            _ => return Err(StoreError::UnsupportedFormat(path.to_path_buf())),
        };
        tracing::debug!("loaded copy plan {} ({} copiers)", path.display(), plan.copiers.len());
        Ok(plan)
    }

    /// Compile every copier into a registry over [`Store`].
    pub fn compile(&self) -> Result<Registry<Store>> {
        let mut seen = HashSet::new();
        let mut builder = Registry::builder();
        if self.by_convention {
            builder = builder.by_convention();
        }

        for copier in &self.copiers {
            let namespace = copier.namespace();
            if copier.name.contains(Namespace::SEPARATOR) {
                return Err(StoreError::Plan(format!(
                    "copier name `{}` must not be qualified, use `namespace`",
                    copier.name
                )));
            }
            if !seen.insert(namespace.qualify(&copier.name)) {
                return Err(StoreError::Plan(format!(
                    "copier `{}` is declared twice",
                    namespace.qualify(&copier.name)
                )));
            }

            let rules = copier.compile_rules(&self.options)?;
            builder = builder.handle(CopierType::in_namespace(namespace.clone(), &copier.name, rules));
            if let Some(type_tag) = &copier.for_type {
                builder = builder.for_type_in(namespace, type_tag, &copier.name);
            }
        }

        Ok(builder.build()?)
    }

    /// Compile the plan and report problems that only surface during a copy:
    /// edges naming unknown copiers, an unknown root copier and, given a
    /// schema, fields or relations the copied type does not declare.
    pub fn check(&self, schema: Option<&Schema>) -> Result<Vec<String>> {
        let registry = self.compile()?;
        let mut problems = Vec::new();

        if let Some(root) = &self.root {
            if let Err(err) = registry.resolve_explicit(&CopierRef::from(root.as_str()), None) {
                problems.push(format!("root: {err}"));
            }
        }

        for copier in &self.copiers {
            let namespace = copier.namespace();
            let label = namespace.qualify(&copier.name);
            let copied_type = copier.copied_type(self.by_convention);
            let declared = match (schema, copied_type.as_deref()) {
                (Some(schema), Some(type_name)) if schema.has_type(type_name) => Some((schema, type_name)),
                (Some(_), Some(type_name)) => {
                    problems.push(format!("{label}: type `{type_name}` is not in the schema"));
                    None
                }
                _ => None,
            };

            for rule in &copier.rules {
                if let Some(edge) = rule.edge() {
                    if let DeepPlan::Copier(name) = &edge.deep {
                        let scope = edge.namespace.as_deref().map(Namespace::new).unwrap_or_else(|| namespace.clone());
                        if let Err(err) = registry.resolve_explicit(&CopierRef::from(name.as_str()), Some(&scope)) {
                            problems.push(format!("{label}: {err}"));
                        }
                    }
                }

                let Some((schema, type_name)) = declared else {
                    continue;
                };
                for missing in rule.undeclared_in(schema, type_name) {
                    problems.push(format!("{label}: `{type_name}` has no {missing}"));
                }
            }
        }

        Ok(problems)
    }
}

impl CopierPlan {
    fn namespace(&self) -> Namespace {
        self.namespace.as_deref().map(Namespace::new).unwrap_or_default()
    }

    /// Type this copier copies, when the plan says so.
    fn copied_type(&self, by_convention: bool) -> Option<String> {
        self.for_type.clone().or_else(|| {
            by_convention
                .then(|| self.name.strip_suffix(CONVENTION_SUFFIX))
                .flatten()
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
        })
    }

    fn compile_rules(&self, options: &CopyOptions) -> Result<CopyRuleSet<Store>> {
        let mut rules = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let compiled = match rule {
                RulePlan::Fields(fields) => CopyRule::Fields(fields.clone()),
                RulePlan::Set { field, value } => CopyRule::Set {
                    field: field.clone(),
                    value: value.clone(),
                },
                RulePlan::Reference(edge) => {
                    if edge.mode.is_some() {
                        return Err(self.invalid(edge, "`mode` only applies to collections"));
                    }
                    CopyRule::Reference(self.compile_edge(edge)?)
                }
                RulePlan::Collection(edge) => CopyRule::Collection {
                    edge: self.compile_edge(edge)?,
                    mode: edge.mode.unwrap_or(options.default_collection_mode),
                },
                RulePlan::Commit(mode) => CopyRule::Commit(*mode),
            };
            rules.push(compiled);
        }
        Ok(CopyRuleSet::from(rules))
    }

    fn compile_edge(&self, edge: &EdgePlan) -> Result<EdgeRule<Store>> {
        let policy = match (&edge.deep, edge.polymorphic) {
            (DeepPlan::Flag(false), false) => DeepPolicy::Shallow,
            (DeepPlan::Flag(false), true) => DeepPolicy::Polymorphic,
            (DeepPlan::Copier(name), false) => DeepPolicy::copier(name.as_str()),
            (DeepPlan::Flag(true), _) => {
                return Err(self.invalid(edge, "`deep: true` needs a copier name or `polymorphic: true`"));
            }
            (DeepPlan::Copier(_), true) => {
                return Err(self.invalid(edge, "`deep` and `polymorphic` are exclusive"));
            }
        };

        let namespace = edge
            .namespace
            .as_deref()
            .map(Namespace::new)
            .unwrap_or_else(|| self.namespace());
        let rule = EdgeRule::new(&edge.name).deep(policy).in_namespace(namespace);
        Ok(match edge.build {
            BuildPlan::Related => rule,
            BuildPlan::Empty => rule.build_default(),
        })
    }

    fn invalid(&self, edge: &EdgePlan, reason: &str) -> StoreError {
        StoreError::Plan(format!("{}.{}: {reason}", self.name, edge.name))
    }
}

impl RulePlan {
    fn edge(&self) -> Option<&EdgePlan> {
        match self {
            RulePlan::Reference(edge) | RulePlan::Collection(edge) => Some(edge),
            _ => None,
        }
    }

    /// Fields or relations this rule touches that `type_name` does not declare.
    fn undeclared_in(&self, schema: &Schema, type_name: &str) -> Vec<String> {
        match self {
            RulePlan::Fields(fields) => fields
                .iter()
                .filter(|field| !schema.has_field(type_name, field))
                .map(|field| format!("field `{field}`"))
                .collect(),
            RulePlan::Set { field, .. } if !schema.has_field(type_name, field) => {
                vec![format!("field `{field}`")]
            }
            RulePlan::Reference(edge) if schema.reference(type_name, &edge.name).is_none() => {
                vec![format!("reference `{}`", edge.name)]
            }
            RulePlan::Collection(edge) if schema.collection(type_name, &edge.name).is_none() => {
                vec![format!("collection `{}`", edge.name)]
            }
            _ => Vec::new(),
        }
    }
}
