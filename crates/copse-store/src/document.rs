//! Graph documents: a schema plus labelled records, read from and written to JSON or YAML

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use copse_core::{CommitMode, FieldAccessible, Persist};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::record::{NodeRef, Record};
use crate::schema::Schema;
use crate::store::Store;

/// A record in a [`GraphDocument`]. Relations name other records by label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub references: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub collections: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub committed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub schema: Schema,
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeDocument>,
}

/// Document format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("yaml") | Some("yml") => Ok(Format::Yaml),
            _ => Err(StoreError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

impl GraphDocument {
    pub fn parse(text: &str, format: Format) -> Result<Self> {
        Ok(match format {
            Format::Json => serde_json::from_str(text)?,
            Format::Yaml => serde_yaml::from_str(text)?,
        })
    }

    pub fn render(&self, format: Format) -> Result<String> {
        Ok(match format {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Yaml => serde_yaml::to_string(self)?,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let format = Format::from_path(path)?;
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, format)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let format = Format::from_path(path)?;
        std::fs::write(path, self.render(format)?)?;
        Ok(())
    }
}

impl Store {
    /// Build a store from a document. Returns the store and the handle of
    /// every labelled record.
    pub fn load_document(document: &GraphDocument) -> Result<(Store, BTreeMap<String, NodeRef>)> {
        let store = Store::new(document.schema.clone())?;

        let mut labels = BTreeMap::new();
        for (label, node) in &document.nodes {
            let id = store.create(&node.type_name)?;
            for (field, value) in &node.fields {
                store.write_field(&id, field, value.clone())?;
            }
            labels.insert(label.clone(), id);
        }

        let resolve = |label: &String| {
            labels
                .get(label)
                .copied()
                .ok_or_else(|| StoreError::UnknownLabel(label.clone()))
        };
        for (label, node) in &document.nodes {
            let id = resolve(label)?;
            for (relation, related) in &node.references {
                store.set_reference(id, relation, Some(resolve(related)?))?;
            }
            for (relation, members) in &node.collections {
                for member in members {
                    store.push(id, relation, resolve(member)?)?;
                }
            }
            if node.committed {
                store.commit(&id, CommitMode::SkipValidation)?;
            }
        }

        tracing::debug!(
            "loaded {} records of {} types",
            store.len(),
            document.schema.types.len()
        );
        Ok((store, labels))
    }

    /// Document holding every record reachable from `root`, labelled by handle.
    pub fn export(&self, root: NodeRef) -> Result<GraphDocument> {
        let records = self.reachable(root)?;
        tracing::debug!("exporting {} records reachable from {}", records.len(), root);
        Ok(self.document_of(records))
    }

    /// Document holding every record in the store.
    pub fn export_all(&self) -> GraphDocument {
        let records = self.ids().into_iter().filter_map(|id| self.get(id)).collect();
        self.document_of(records)
    }

    fn document_of(&self, records: Vec<Record>) -> GraphDocument {
        let labels: HashMap<NodeRef, String> = records
            .iter()
            .map(|record| (record.id, record.id.to_string()))
            .collect();
        let label = |id: &NodeRef| labels.get(id).cloned().unwrap_or_else(|| id.to_string());

        let nodes = records
            .iter()
            .map(|record| {
                let node = NodeDocument {
                    type_name: record.type_name.clone(),
                    fields: record.fields.clone(),
                    references: record
                        .references
                        .iter()
                        .map(|(relation, related)| (relation.clone(), label(related)))
                        .collect(),
                    collections: record
                        .collections
                        .iter()
                        .map(|(relation, members)| (relation.clone(), members.iter().map(&label).collect()))
                        .collect(),
                    committed: record.is_committed(),
                };
                (label(&record.id), node)
            })
            .collect();

        GraphDocument {
            schema: self.schema().clone(),
            nodes,
        }
    }
}
