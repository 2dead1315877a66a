//! In-memory record store implementing the copy engine's host traits

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use copse_core::{
    CollectionAccessible, CommitMode, CopyError, EdgeAccessible, FieldAccessible, NodeKey,
    NodeSpace, Persist, Result,
};
use dashmap::DashMap;
use serde_json::Value;

use crate::error::StoreError;
use crate::record::{NodeRef, Record};
use crate::schema::{RelationDef, Schema};

/// Typed records keyed by [`NodeRef`], checked against a [`Schema`].
///
/// Records live in a `DashMap` so a copier can read sources and write targets
/// through a shared `&Store`. No map guard is held across calls that touch
/// another record.
pub struct Store {
    schema: Schema,
    records: DashMap<NodeRef, Record>,
    next_id: AtomicU64,
}

impl Store {
    /// Create an empty store. Fails if the schema is inconsistent.
    pub fn new(schema: Schema) -> crate::Result<Self> {
        schema.validate()?;
        Ok(Store {
            schema,
            records: DashMap::new(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Create an empty record of `type_name`.
    pub fn create(&self, type_name: &str) -> Result<NodeRef> {
        if !self.schema.has_type(type_name) {
            return Err(CopyError::field_access(type_name, "*", "undeclared type"));
        }
        let id = NodeRef(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.records.insert(id, Record::new(id, type_name));
        Ok(id)
    }

    /// Create a record with the given scalar fields.
    pub fn insert<I, K>(&self, type_name: &str, fields: I) -> Result<NodeRef>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let id = self.create(type_name)?;
        for (field, value) in fields {
            self.write_field(&id, &field.into(), value)?;
        }
        Ok(id)
    }

    /// Snapshot of a record.
    pub fn get(&self, node: NodeRef) -> Option<Record> {
        self.records.get(&node).map(|r| r.value().clone())
    }

    pub fn contains(&self, node: NodeRef) -> bool {
        self.records.contains_key(&node)
    }

    /// Type of a stored record; unlike [`NodeSpace::type_tag`] a dangling
    /// handle is an error.
    pub fn type_name(&self, node: NodeRef) -> crate::Result<String> {
        self.records
            .get(&node)
            .map(|r| r.type_name.clone())
            .ok_or(StoreError::MissingRecord(node))
    }

    pub fn field(&self, node: NodeRef, field: &str) -> Value {
        self.records
            .get(&node)
            .map(|r| r.field(field).clone())
            .unwrap_or(Value::Null)
    }

    pub fn reference(&self, node: NodeRef, relation: &str) -> Option<NodeRef> {
        self.records
            .get(&node)
            .and_then(|r| r.references.get(relation).copied())
    }

    pub fn members(&self, node: NodeRef, relation: &str) -> Vec<NodeRef> {
        self.records
            .get(&node)
            .and_then(|r| r.collections.get(relation).cloned())
            .unwrap_or_default()
    }

    pub fn is_committed(&self, node: NodeRef) -> bool {
        self.records
            .get(&node)
            .map_or(false, |r| r.is_committed())
    }

    /// Link `node.relation` to `related`, checking the schema.
    pub fn set_reference(&self, node: NodeRef, relation: &str, related: Option<NodeRef>) -> Result<()> {
        self.write_reference(&node, relation, related)
    }

    /// Append `member` to `node.relation`, checking the schema.
    pub fn push(&self, node: NodeRef, relation: &str, member: NodeRef) -> Result<()> {
        self.append_to_collection(&node, relation, member)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All record handles, ascending.
    pub fn ids(&self) -> Vec<NodeRef> {
        let mut ids: Vec<NodeRef> = self.records.iter().map(|r| *r.key()).collect();
        ids.sort();
        ids
    }

    /// Records reachable from `root` through references and collections,
    /// breadth first, `root` first.
    pub fn reachable(&self, root: NodeRef) -> crate::Result<Vec<Record>> {
        let first = self.get(root).ok_or(StoreError::MissingRecord(root))?;
        let mut seen = HashSet::from([root]);
        let mut queue = VecDeque::from([first]);
        let mut records = Vec::new();
        while let Some(record) = queue.pop_front() {
            for (_, next) in record.edges() {
                if seen.insert(next) {
                    let next = self.get(next).ok_or(StoreError::MissingRecord(next))?;
                    queue.push_back(next);
                }
            }
            records.push(record);
        }
        Ok(records)
    }

    fn type_of(&self, node: NodeRef) -> Result<String> {
        self.records
            .get(&node)
            .map(|r| r.type_name.clone())
            .ok_or_else(|| CopyError::field_access(node.to_string(), "*", "no such record"))
    }

    fn reference_def(&self, node: NodeRef, relation: &str) -> Result<(String, RelationDef)> {
        let type_name = self.type_of(node)?;
        match self.schema.reference(&type_name, relation) {
            Some(def) => Ok((type_name, def.clone())),
            None => Err(CopyError::field_access(type_name, relation, "no such reference")),
        }
    }

    fn collection_def(&self, node: NodeRef, relation: &str) -> Result<(String, RelationDef)> {
        let type_name = self.type_of(node)?;
        match self.schema.collection(&type_name, relation) {
            Some(def) => Ok((type_name, def.clone())),
            None => Err(CopyError::field_access(type_name, relation, "no such collection")),
        }
    }

    fn check_member(&self, owner_type: &str, relation: &str, def: &RelationDef, member: NodeRef) -> Result<()> {
        let member_type = self.type_of(member)?;
        if self.schema.is_a(&member_type, &def.target) {
            Ok(())
        } else {
            Err(CopyError::field_access(
                owner_type,
                relation,
                format!("expects `{}`, got `{member_type}`", def.target),
            ))
        }
    }

    fn update<T>(&self, node: NodeRef, apply: impl FnOnce(&mut Record) -> T) -> Result<T> {
        let mut record = self
            .records
            .get_mut(&node)
            .ok_or_else(|| CopyError::field_access(node.to_string(), "*", "no such record"))?;
        Ok(apply(record.value_mut()))
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("types", &self.schema.types.len())
            .field("records", &self.records.len())
            .finish()
    }
}

impl NodeSpace for Store {
    type Node = NodeRef;

    fn identity(&self, node: &NodeRef) -> NodeKey {
        NodeKey(node.0)
    }

    fn type_tag(&self, node: &NodeRef) -> String {
        match self.records.get(node) {
            Some(record) => record.type_name.clone(),
            None => {
                tracing::warn!("type of {} requested but no such record is stored", node);
                String::new()
            }
        }
    }

    fn construct_empty(&self, like: &NodeRef) -> Result<NodeRef> {
        let type_name = self.type_of(*like)?;
        self.create(&type_name)
    }
}

impl FieldAccessible for Store {
    type Value = Value;

    fn read_field(&self, node: &NodeRef, field: &str) -> Result<Value> {
        let type_name = self.type_of(*node)?;
        if !self.schema.has_field(&type_name, field) {
            return Err(CopyError::field_access(type_name, field, "no such field"));
        }
        Ok(self.field(*node, field))
    }

    fn write_field(&self, node: &NodeRef, field: &str, value: Value) -> Result<()> {
        let type_name = self.type_of(*node)?;
        if !self.schema.has_field(&type_name, field) {
            return Err(CopyError::field_access(type_name, field, "no such field"));
        }
        self.update(*node, |record| {
            record.fields.insert(field.to_string(), value);
        })
    }
}

impl EdgeAccessible for Store {
    fn read_reference(&self, node: &NodeRef, relation: &str) -> Result<Option<NodeRef>> {
        self.reference_def(*node, relation)?;
        Ok(self.reference(*node, relation))
    }

    fn write_reference(&self, node: &NodeRef, relation: &str, related: Option<NodeRef>) -> Result<()> {
        let (type_name, def) = self.reference_def(*node, relation)?;
        if let Some(related) = related {
            self.check_member(&type_name, relation, &def, related)?;
        }
        self.update(*node, |record| match related {
            Some(related) => {
                record.references.insert(relation.to_string(), related);
            }
            None => {
                record.references.remove(relation);
            }
        })
    }

    fn build_related(&self, owner: &NodeRef, relation: &str, type_tag: Option<&str>) -> Result<NodeRef> {
        let (owner_type, def) = self
            .reference_def(*owner, relation)
            .or_else(|_| self.collection_def(*owner, relation))?;
        let type_name = type_tag.unwrap_or(&def.target);
        if !self.schema.is_a(type_name, &def.target) {
            return Err(CopyError::field_access(
                owner_type,
                relation,
                format!("cannot build `{type_name}`, expects `{}`", def.target),
            ));
        }
        let built = self.create(type_name)?;
        if let Some(inverse) = &def.inverse {
            self.write_reference(&built, inverse, Some(*owner))?;
        }
        tracing::trace!("built {} {} for {}.{}", type_name, built, owner, relation);
        Ok(built)
    }
}

impl CollectionAccessible for Store {
    fn read_collection(&self, node: &NodeRef, relation: &str) -> Result<Vec<NodeRef>> {
        self.collection_def(*node, relation)?;
        Ok(self.members(*node, relation))
    }

    fn append_to_collection(&self, node: &NodeRef, relation: &str, member: NodeRef) -> Result<()> {
        let (type_name, def) = self.collection_def(*node, relation)?;
        self.check_member(&type_name, relation, &def, member)?;
        self.update(*node, |record| {
            record
                .collections
                .entry(relation.to_string())
                .or_default()
                .push(member);
        })
    }

    fn replace_collection(&self, node: &NodeRef, relation: &str, members: Vec<NodeRef>) -> Result<()> {
        let (type_name, def) = self.collection_def(*node, relation)?;
        for member in &members {
            self.check_member(&type_name, relation, &def, *member)?;
        }
        self.update(*node, |record| {
            record.collections.insert(relation.to_string(), members);
        })
    }
}

impl Persist for Store {
    fn commit(&self, node: &NodeRef, mode: CommitMode) -> Result<()> {
        let type_name = self.type_of(*node)?;
        if mode == CommitMode::Validated {
            let missing: Vec<String> = self
                .schema
                .required_fields(&type_name)
                .into_iter()
                .filter(|field| self.field(*node, field).is_null())
                .map(|field| format!("{field} can't be blank"))
                .collect();
            if !missing.is_empty() {
                return Err(CopyError::persistence(type_name, missing));
            }
        }
        self.update(*node, |record| record.committed_at = Some(Utc::now()))?;
        tracing::debug!("committed {} {} ({:?})", type_name, node, mode);
        Ok(())
    }
}
