//! Copse Store — in-memory typed record store hosting the copy engine,
//! with graph documents, copy plans and petgraph snapshots

pub mod document;
pub mod error;
pub mod plan;
pub mod record;
pub mod schema;
pub mod snapshot;
pub mod store;

pub use document::{Format, GraphDocument, NodeDocument};
pub use error::{Result, StoreError};
pub use plan::{BuildPlan, CopierPlan, CopyPlan, DeepPlan, EdgePlan, RulePlan};
pub use record::{NodeRef, Record};
pub use schema::{RelationDef, Schema, TypeDef};
pub use snapshot::{Snapshot, SnapshotNode};
pub use store::Store;
