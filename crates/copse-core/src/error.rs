//! Error taxonomy for copy sessions.
//!
//! Every error is fail-fast: the copier that hits it stops running rules and
//! the error travels up through every enclosing copier to the caller. Targets
//! already populated (or committed) stay as they are.

use crate::model::{Namespace, NodeKey};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CopyError {
    /// A named copier, or the copier registered for a runtime type, does not exist.
    #[error("unresolved copier type `{name}` in namespace {namespace}")]
    UnresolvedType { name: String, namespace: Namespace },

    /// A field or relation could not be read from the source or written to the target.
    #[error("cannot access `{field}` on `{type_tag}`: {reason}")]
    FieldAccess {
        type_tag: String,
        field: String,
        reason: String,
    },

    /// The host refused to persist a target.
    #[error("failed to commit `{type_tag}`: {}", details.join("; "))]
    Persistence { type_tag: String, details: Vec<String> },

    /// Nested copiers went deeper than the configured limit.
    #[error("copy exceeded the maximum depth of {limit} nested copiers")]
    DepthExceeded { limit: usize },

    /// A source was registered twice with different targets.
    #[error("source {key} is already mapped to a different target")]
    IdentityConflict { key: NodeKey },

    /// A custom rule returned an error of its own.
    #[error("custom rule in `{copier}` failed: {source}")]
    Custom {
        copier: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T> = std::result::Result<T, CopyError>;

impl CopyError {
    pub fn unresolved(name: impl Into<String>, namespace: Namespace) -> Self {
        CopyError::UnresolvedType {
            name: name.into(),
            namespace,
        }
    }

    pub fn field_access(
        type_tag: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CopyError::FieldAccess {
            type_tag: type_tag.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn persistence(type_tag: impl Into<String>, details: Vec<String>) -> Self {
        CopyError::Persistence {
            type_tag: type_tag.into(),
            details,
        }
    }

    /// Wrap a custom-rule failure, unwrapping it first if the rule simply
    /// forwarded an engine error with `?`.
    pub fn from_custom(copier: &str, error: anyhow::Error) -> Self {
        match error.downcast::<CopyError>() {
            Ok(inner) => inner,
            Err(source) => CopyError::Custom {
                copier: copier.to_string(),
                source,
            },
        }
    }
}
