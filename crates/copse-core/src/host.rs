//! Capability traits a host environment implements so the engine can walk
//! and build its object graph.
//!
//! All methods take `&self`: a copier reads sources and writes targets through
//! the same host, so hosts that own their nodes use interior mutability.

use std::fmt;

use crate::error::Result;
use crate::model::{CommitMode, NodeKey};

/// Identity, runtime type and default construction of nodes.
pub trait NodeSpace {
    /// Handle to a node. Equality must be identity, not structural equality.
    type Node: Clone + PartialEq + fmt::Debug;

    /// Stable key for `node`, independent of its field contents.
    fn identity(&self, node: &Self::Node) -> NodeKey;

    /// Name of the node's concrete runtime type.
    fn type_tag(&self, node: &Self::Node) -> String;

    /// A new, empty node of the same runtime type as `like`.
    fn construct_empty(&self, like: &Self::Node) -> Result<Self::Node>;
}

/// Scalar field reads and writes.
pub trait FieldAccessible: NodeSpace {
    type Value: Clone + fmt::Debug;

    fn read_field(&self, node: &Self::Node, field: &str) -> Result<Self::Value>;

    fn write_field(&self, node: &Self::Node, field: &str, value: Self::Value) -> Result<()>;
}

/// Single-valued relations.
pub trait EdgeAccessible: NodeSpace {
    fn read_reference(&self, node: &Self::Node, relation: &str) -> Result<Option<Self::Node>>;

    fn write_reference(
        &self,
        node: &Self::Node,
        relation: &str,
        related: Option<Self::Node>,
    ) -> Result<()>;

    /// Construct a new, empty node for `relation` of `owner`, letting the host
    /// run its own construction logic (back-references, defaults).
    ///
    /// `type_tag` overrides the relation's declared type, used when the member
    /// is a subtype. The node is not attached to the relation; the caller
    /// writes or appends it.
    fn build_related(
        &self,
        owner: &Self::Node,
        relation: &str,
        type_tag: Option<&str>,
    ) -> Result<Self::Node>;
}

/// Ordered, many-valued relations.
pub trait CollectionAccessible: NodeSpace {
    /// Members in their natural order.
    fn read_collection(&self, node: &Self::Node, relation: &str) -> Result<Vec<Self::Node>>;

    fn append_to_collection(&self, node: &Self::Node, relation: &str, member: Self::Node)
        -> Result<()>;

    fn replace_collection(
        &self,
        node: &Self::Node,
        relation: &str,
        members: Vec<Self::Node>,
    ) -> Result<()>;
}

/// Durable persistence of targets.
pub trait Persist: NodeSpace {
    /// Persist `node`. Validation failures surface as `CopyError::Persistence`.
    fn commit(&self, node: &Self::Node, mode: CommitMode) -> Result<()>;
}

/// Everything a copy session needs from its environment.
pub trait Host: FieldAccessible + EdgeAccessible + CollectionAccessible + Persist {}

impl<T> Host for T where T: FieldAccessible + EdgeAccessible + CollectionAccessible + Persist {}
