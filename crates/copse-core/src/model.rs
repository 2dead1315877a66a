//! Core value types shared by the engine and its hosts

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity of a source node for the lifetime of a copy session.
///
/// Hosts decide how keys are derived (a record id, a pointer address, ...).
/// Two handles yield the same key if and only if they denote the same node;
/// the key never depends on the node's mutable field state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct NodeKey(pub u64);

impl NodeKey {
    /// Derive a key from the address of a heap-allocated node.
    ///
    /// Only stable while the allocation is alive, which callers guarantee by
    /// holding the source graph for the whole session.
    pub fn from_ptr<T: ?Sized>(ptr: *const T) -> Self {
        NodeKey(ptr as *const () as usize as u64)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Namespace under which copier types are registered.
///
/// The empty namespace is the root. Nested namespaces are written with `::`
/// separators, e.g. `billing::legacy`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    pub const SEPARATOR: &'static str = "::";

    pub fn root() -> Self {
        Namespace(String::new())
    }

    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Namespace(path.trim_matches(':').to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split `a::b::Name` into (`Some(a::b)`, `Name`). Unqualified names
    /// return `None` as namespace.
    pub fn split_qualified(name: &str) -> (Option<Namespace>, &str) {
        match name.rfind(Self::SEPARATOR) {
            Some(pos) => {
                let local = &name[pos + Self::SEPARATOR.len()..];
                (Some(Namespace::new(&name[..pos])), local)
            }
            None => (None, name),
        }
    }

    /// Fully qualified form of `name` within this namespace.
    pub fn qualify(&self, name: &str) -> String {
        if self.is_root() {
            name.to_string()
        } else {
            format!("{}{}{}", self.0, Self::SEPARATOR, name)
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("(root)")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for Namespace {
    fn from(path: &str) -> Self {
        Namespace::new(path)
    }
}

/// How a collection edge is written to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMode {
    /// Push copied members after whatever the target collection already holds.
    #[default]
    Append,
    /// Replace the target collection with exactly the copied members.
    Replace,
}

/// How a commit rule asks the host to persist the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// Run host validation before persisting.
    #[default]
    Validated,
    /// Persist without validation.
    SkipValidation,
}
