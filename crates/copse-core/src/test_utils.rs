//! Test utilities: an in-memory host whose nodes are shared `Rc` cells

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::error::{CopyError, Result};
use crate::host::{CollectionAccessible, EdgeAccessible, FieldAccessible, NodeSpace, Persist};
use crate::model::{CommitMode, NodeKey};

#[derive(Debug, Default)]
pub struct FakeNode {
    pub type_tag: String,
    pub fields: BTreeMap<String, Value>,
    pub references: BTreeMap<String, Option<FakeRef>>,
    pub collections: BTreeMap<String, Vec<FakeRef>>,
    pub committed: bool,
}

/// Node handle compared by pointer.
#[derive(Clone)]
pub struct FakeRef(pub Rc<RefCell<FakeNode>>);

impl PartialEq for FakeRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for FakeRef {
    // Nodes may be cyclic, so only print the node's own scalars.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.0.borrow();
        write!(f, "{}{:?}", node.type_tag, node.fields)
    }
}

#[derive(Debug, Clone, Default)]
struct Shape {
    fields: Vec<String>,
    references: HashMap<String, String>,
    collections: HashMap<String, String>,
}

/// Host with declared per-type shapes, construction counters, a commit log
/// and types whose commits are rejected.
#[derive(Default)]
pub struct FakeHost {
    shapes: HashMap<String, Shape>,
    constructed: RefCell<HashMap<String, usize>>,
    commit_log: RefCell<Vec<String>>,
    rejected: HashMap<String, Vec<String>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(
        mut self,
        type_tag: &str,
        fields: &[&str],
        references: &[(&str, &str)],
        collections: &[(&str, &str)],
    ) -> Self {
        let shape = Shape {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            references: references
                .iter()
                .map(|(name, target)| (name.to_string(), target.to_string()))
                .collect(),
            collections: collections
                .iter()
                .map(|(name, target)| (name.to_string(), target.to_string()))
                .collect(),
        };
        self.shapes.insert(type_tag.to_string(), shape);
        self
    }

    /// Declare `type_tag` with the same shape as `parent`.
    pub fn with_subtype(mut self, type_tag: &str, parent: &str) -> Self {
        let shape = self.shapes.get(parent).cloned().unwrap_or_default();
        self.shapes.insert(type_tag.to_string(), shape);
        self
    }

    pub fn rejecting(mut self, type_tag: &str, details: &[&str]) -> Self {
        self.rejected.insert(
            type_tag.to_string(),
            details.iter().map(|d| d.to_string()).collect(),
        );
        self
    }

    /// Create a node directly; not counted as a construction.
    pub fn node(&self, type_tag: &str, fields: Value) -> FakeRef {
        let fields = match fields {
            Value::Object(map) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };
        FakeRef(Rc::new(RefCell::new(FakeNode {
            type_tag: type_tag.to_string(),
            fields,
            ..FakeNode::default()
        })))
    }

    pub fn link(&self, node: &FakeRef, relation: &str, related: &FakeRef) {
        node.0
            .borrow_mut()
            .references
            .insert(relation.to_string(), Some(related.clone()));
    }

    pub fn push(&self, node: &FakeRef, relation: &str, member: &FakeRef) {
        node.0
            .borrow_mut()
            .collections
            .entry(relation.to_string())
            .or_default()
            .push(member.clone());
    }

    pub fn field(&self, node: &FakeRef, field: &str) -> Value {
        node.0.borrow().fields.get(field).cloned().unwrap_or(Value::Null)
    }

    pub fn reference(&self, node: &FakeRef, relation: &str) -> Option<FakeRef> {
        node.0.borrow().references.get(relation).cloned().flatten()
    }

    pub fn members(&self, node: &FakeRef, relation: &str) -> Vec<FakeRef> {
        node.0
            .borrow()
            .collections
            .get(relation)
            .cloned()
            .unwrap_or_default()
    }

    pub fn constructed(&self, type_tag: &str) -> usize {
        self.constructed.borrow().get(type_tag).copied().unwrap_or(0)
    }

    pub fn commit_log(&self) -> Vec<String> {
        self.commit_log.borrow().clone()
    }

    pub fn is_committed(&self, node: &FakeRef) -> bool {
        node.0.borrow().committed
    }

    fn shape(&self, node: &FakeRef) -> Result<Shape> {
        let type_tag = node.0.borrow().type_tag.clone();
        self.shapes
            .get(&type_tag)
            .cloned()
            .ok_or_else(|| CopyError::field_access(type_tag, "*", "undeclared type"))
    }

    fn instantiate(&self, type_tag: &str) -> Result<FakeRef> {
        if !self.shapes.contains_key(type_tag) {
            return Err(CopyError::field_access(type_tag, "*", "undeclared type"));
        }
        *self
            .constructed
            .borrow_mut()
            .entry(type_tag.to_string())
            .or_insert(0) += 1;
        Ok(self.node(type_tag, Value::Null))
    }

    fn check_field(&self, node: &FakeRef, field: &str) -> Result<()> {
        if self.shape(node)?.fields.iter().any(|f| f == field) {
            Ok(())
        } else {
            Err(CopyError::field_access(self.type_tag(node), field, "no such field"))
        }
    }

    fn check_reference(&self, node: &FakeRef, relation: &str) -> Result<String> {
        self.shape(node)?
            .references
            .get(relation)
            .cloned()
            .ok_or_else(|| CopyError::field_access(self.type_tag(node), relation, "no such reference"))
    }

    fn check_collection(&self, node: &FakeRef, relation: &str) -> Result<String> {
        self.shape(node)?
            .collections
            .get(relation)
            .cloned()
            .ok_or_else(|| CopyError::field_access(self.type_tag(node), relation, "no such collection"))
    }
}

impl NodeSpace for FakeHost {
    type Node = FakeRef;

    fn identity(&self, node: &FakeRef) -> NodeKey {
        NodeKey::from_ptr(Rc::as_ptr(&node.0))
    }

    fn type_tag(&self, node: &FakeRef) -> String {
        node.0.borrow().type_tag.clone()
    }

    fn construct_empty(&self, like: &FakeRef) -> Result<FakeRef> {
        self.instantiate(&self.type_tag(like))
    }
}

impl FieldAccessible for FakeHost {
    type Value = Value;

    fn read_field(&self, node: &FakeRef, field: &str) -> Result<Value> {
        self.check_field(node, field)?;
        Ok(self.field(node, field))
    }

    fn write_field(&self, node: &FakeRef, field: &str, value: Value) -> Result<()> {
        self.check_field(node, field)?;
        node.0.borrow_mut().fields.insert(field.to_string(), value);
        Ok(())
    }
}

impl EdgeAccessible for FakeHost {
    fn read_reference(&self, node: &FakeRef, relation: &str) -> Result<Option<FakeRef>> {
        self.check_reference(node, relation)?;
        Ok(self.reference(node, relation))
    }

    fn write_reference(&self, node: &FakeRef, relation: &str, related: Option<FakeRef>) -> Result<()> {
        self.check_reference(node, relation)?;
        node.0
            .borrow_mut()
            .references
            .insert(relation.to_string(), related);
        Ok(())
    }

    fn build_related(&self, owner: &FakeRef, relation: &str, type_tag: Option<&str>) -> Result<FakeRef> {
        let declared = self
            .check_reference(owner, relation)
            .or_else(|_| self.check_collection(owner, relation))?;
        self.instantiate(type_tag.unwrap_or(&declared))
    }
}

impl CollectionAccessible for FakeHost {
    fn read_collection(&self, node: &FakeRef, relation: &str) -> Result<Vec<FakeRef>> {
        self.check_collection(node, relation)?;
        Ok(self.members(node, relation))
    }

    fn append_to_collection(&self, node: &FakeRef, relation: &str, member: FakeRef) -> Result<()> {
        self.check_collection(node, relation)?;
        self.push(node, relation, &member);
        Ok(())
    }

    fn replace_collection(&self, node: &FakeRef, relation: &str, members: Vec<FakeRef>) -> Result<()> {
        self.check_collection(node, relation)?;
        node.0
            .borrow_mut()
            .collections
            .insert(relation.to_string(), members);
        Ok(())
    }
}

impl Persist for FakeHost {
    fn commit(&self, node: &FakeRef, mode: CommitMode) -> Result<()> {
        let type_tag = self.type_tag(node);
        if mode == CommitMode::Validated {
            if let Some(details) = self.rejected.get(&type_tag) {
                return Err(CopyError::persistence(type_tag, details.clone()));
            }
        }
        node.0.borrow_mut().committed = true;
        self.commit_log
            .borrow_mut()
            .push(format!("{} {}", type_tag, self.field(node, "name")));
        Ok(())
    }
}
