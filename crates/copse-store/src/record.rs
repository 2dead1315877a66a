//! Stored records and their handles

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Handle to a record in a [`Store`](crate::Store). Equal handles denote the same record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef(pub u64);

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A typed record: scalar fields, single references and ordered collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: NodeRef,
    pub type_name: String,
    pub fields: BTreeMap<String, Value>,
    pub references: BTreeMap<String, NodeRef>,
    pub collections: BTreeMap<String, Vec<NodeRef>>,
    /// Set by the last successful commit.
    pub committed_at: Option<DateTime<Utc>>,
}

impl Record {
    pub fn new(id: NodeRef, type_name: impl Into<String>) -> Self {
        Record {
            id,
            type_name: type_name.into(),
            fields: BTreeMap::new(),
            references: BTreeMap::new(),
            collections: BTreeMap::new(),
            committed_at: None,
        }
    }

    pub fn field(&self, name: &str) -> &Value {
        self.fields.get(name).unwrap_or(&Value::Null)
    }

    pub fn is_committed(&self) -> bool {
        self.committed_at.is_some()
    }

    /// Every outgoing edge as `(label, target)`; collection members are
    /// labelled `relation[index]`, in order.
    pub fn edges(&self) -> Vec<(String, NodeRef)> {
        let mut edges: Vec<(String, NodeRef)> = self
            .references
            .iter()
            .map(|(name, target)| (name.clone(), *target))
            .collect();
        for (name, members) in &self.collections {
            edges.extend(
                members
                    .iter()
                    .enumerate()
                    .map(|(index, member)| (format!("{name}[{index}]"), *member)),
            );
        }
        edges
    }
}
