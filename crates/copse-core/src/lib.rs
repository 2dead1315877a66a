//! Copse Core — graph copy engine with identity tracking and per-type copy rules

pub mod copier;
pub mod error;
pub mod host;
pub mod identity;
pub mod model;
pub mod options;
pub mod registry;
pub mod rules;
pub mod session;


#[cfg(test)]
pub mod test_utils;

pub use copier::{Copier, CopierState, Scope};
pub use error::{CopyError, Result};
pub use host::{CollectionAccessible, EdgeAccessible, FieldAccessible, Host, NodeSpace, Persist};
pub use identity::{IdentityTable, Lookup};
pub use model::{CollectionMode, CommitMode, Namespace, NodeKey};
pub use options::{CopyOptions, DEFAULT_MAX_DEPTH};
pub use registry::{
    CopierHandle, CopierRef, CopierType, DeepPolicy, Registry, RegistryBuilder, CONVENTION_SUFFIX,
    IDENTITY_COPIER,
};
pub use rules::{CopyRule, CopyRuleSet, CustomAction, EdgeRule, RuleSetBuilder, TargetBuild, TargetBuilder};
pub use session::{copy_graph, CopyReport, CopySession};
