//! Record type declarations for the store

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// A relation from one record type to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Declared type of related records; subtypes are accepted.
    pub target: String,
    /// Reference on the target type that points back at the owner. Records
    /// built through this relation get it pre-linked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<String>,
}

impl RelationDef {
    pub fn to(target: impl Into<String>) -> Self {
        RelationDef {
            target: target.into(),
            inverse: None,
        }
    }

    pub fn inverse(mut self, reference: impl Into<String>) -> Self {
        self.inverse = Some(reference.into());
        self
    }
}

/// One record type. Subtypes name a `parent` and inherit everything it declares.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeDef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub fields: Vec<String>,
    /// Fields that must be non-null for a validated commit.
    pub required: Vec<String>,
    pub references: BTreeMap<String, RelationDef>,
    pub collections: BTreeMap<String, RelationDef>,
}

impl TypeDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn reference(mut self, name: impl Into<String>, relation: RelationDef) -> Self {
        self.references.insert(name.into(), relation);
        self
    }

    pub fn collection(mut self, name: impl Into<String>, relation: RelationDef) -> Self {
        self.collections.insert(name.into(), relation);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub types: BTreeMap<String, TypeDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, name: impl Into<String>, def: TypeDef) -> Self {
        self.types.insert(name.into(), def);
        self
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// `name` followed by its ancestors, nearest first.
    fn lineage<'s>(&'s self, name: &str) -> impl Iterator<Item = &'s TypeDef> + 's {
        let mut next = self.types.get_key_value(name).map(|(key, _)| key.as_str());
        let mut seen = HashSet::new();
        std::iter::from_fn(move || {
            let current = next.take()?;
            if !seen.insert(current) {
                return None;
            }
            let def = self.types.get(current)?;
            next = def.parent.as_deref();
            Some(def)
        })
    }

    /// Whether `name` is `ancestor` or one of its subtypes.
    pub fn is_a(&self, name: &str, ancestor: &str) -> bool {
        let mut current = Some(name);
        let mut seen = HashSet::new();
        while let Some(type_name) = current {
            if type_name == ancestor {
                return true;
            }
            if !seen.insert(type_name) {
                return false;
            }
            current = self.types.get(type_name).and_then(|def| def.parent.as_deref());
        }
        false
    }

    pub fn has_field(&self, type_name: &str, field: &str) -> bool {
        self.lineage(type_name)
            .any(|def| def.fields.iter().any(|f| f == field))
    }

    pub fn reference(&self, type_name: &str, name: &str) -> Option<&RelationDef> {
        self.lineage(type_name).find_map(|def| def.references.get(name))
    }

    pub fn collection(&self, type_name: &str, name: &str) -> Option<&RelationDef> {
        self.lineage(type_name).find_map(|def| def.collections.get(name))
    }

    /// Required fields of `type_name`, inherited ones included.
    pub fn required_fields(&self, type_name: &str) -> Vec<&str> {
        let mut required: Vec<&str> = self
            .lineage(type_name)
            .flat_map(|def| def.required.iter().map(String::as_str))
            .collect();
        required.sort_unstable();
        required.dedup();
        required
    }

    /// Check that parents, relation targets and inverses all exist and that
    /// no type is its own ancestor.
    pub fn validate(&self) -> Result<()> {
        for (name, def) in &self.types {
            if let Some(parent) = &def.parent {
                if !self.has_type(parent) {
                    return Err(StoreError::Schema(format!(
                        "type `{name}` extends unknown type `{parent}`"
                    )));
                }
                if self.is_a(parent, name) {
                    return Err(StoreError::Schema(format!(
                        "type `{name}` is its own ancestor"
                    )));
                }
            }
            for field in &def.required {
                if !self.has_field(name, field) {
                    return Err(StoreError::Schema(format!(
                        "type `{name}` requires undeclared field `{field}`"
                    )));
                }
            }
            let relations = def.references.iter().chain(def.collections.iter());
            for (relation, target) in relations {
                if !self.has_type(&target.target) {
                    return Err(StoreError::Schema(format!(
                        "relation `{name}.{relation}` points at unknown type `{}`",
                        target.target
                    )));
                }
                if let Some(inverse) = &target.inverse {
                    if self.reference(&target.target, inverse).is_none() {
                        return Err(StoreError::Schema(format!(
                            "inverse `{}.{inverse}` of `{name}.{relation}` is not a reference",
                            target.target
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
