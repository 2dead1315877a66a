//! Session-wide copy options

use serde::{Deserialize, Serialize};

use crate::model::CollectionMode;

/// Default for [`CopyOptions::max_depth`].
pub const DEFAULT_MAX_DEPTH: usize = 512;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyOptions {
    /// Deepest chain of nested copiers allowed before the session fails
    /// with `DepthExceeded`. Copies recurse on the native stack.
    pub max_depth: usize,
    /// Mode used by declarative collection rules that do not name one.
    pub default_collection_mode: CollectionMode,
}

impl Default for CopyOptions {
    fn default() -> Self {
        CopyOptions {
            max_depth: DEFAULT_MAX_DEPTH,
            default_collection_mode: CollectionMode::Append,
        }
    }
}
