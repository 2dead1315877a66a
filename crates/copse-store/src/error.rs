//! Errors raised while loading schemas, documents and copy plans

use std::path::PathBuf;

use copse_core::CopyError;
use thiserror::Error;

use crate::record::NodeRef;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Engine or host error surfaced through the store.
    #[error(transparent)]
    Copy(#[from] CopyError),

    #[error("invalid schema: {0}")]
    Schema(String),

    #[error("unknown node label `{0}`")]
    UnknownLabel(String),

    #[error("no record {0} in the store")]
    MissingRecord(NodeRef),

    #[error("invalid copy plan: {0}")]
    Plan(String),

    #[error("unsupported file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("YAML error: {source}")]
    Yaml {
        #[from]
        source: serde_yaml::Error,
    },

    #[error("TOML error: {source}")]
    Toml {
        #[from]
        source: toml::de::Error,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;
