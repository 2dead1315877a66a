//! Identity table: which target was produced for which source

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::error::{CopyError, Result};
use crate::model::NodeKey;

/// Outcome of [`IdentityTable::lookup_or_insert`].
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// The source had already been registered.
    Hit(T),
    /// The source was new; the produced target is now registered.
    Inserted(T),
}

impl<T> Lookup<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Lookup::Hit(target) | Lookup::Inserted(target) => target,
        }
    }
}

/// Source identity to target mapping shared by every copier of one session.
///
/// Entries are only ever added, so `count()` is the number of distinct
/// sources visited so far.
#[derive(Debug, Clone)]
pub struct IdentityTable<T> {
    entries: HashMap<NodeKey, T>,
}

impl<T: Clone + PartialEq> IdentityTable<T> {
    pub fn new() -> Self {
        IdentityTable {
            entries: HashMap::new(),
        }
    }

    /// Continue from a mapping recorded elsewhere.
    pub fn from_map(entries: HashMap<NodeKey, T>) -> Self {
        IdentityTable { entries }
    }

    /// Register `key -> target`.
    ///
    /// Registering the same pair again is a no-op. Registering a different
    /// target for a known key fails with `IdentityConflict`; the stored
    /// target is never replaced.
    pub fn add(&mut self, key: NodeKey, target: T) -> Result<()> {
        match self.entries.entry(key) {
            Entry::Occupied(existing) => {
                if *existing.get() == target {
                    Ok(())
                } else {
                    Err(CopyError::IdentityConflict { key })
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(target);
                Ok(())
            }
        }
    }

    /// Return the target for `key`, or call `produce` once, register its
    /// result and return it. `produce` is never called on a hit.
    pub fn lookup_or_insert<F>(&mut self, key: NodeKey, produce: F) -> Result<Lookup<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Some(existing) = self.entries.get(&key) {
            return Ok(Lookup::Hit(existing.clone()));
        }
        let target = produce()?;
        self.entries.insert(key, target.clone());
        Ok(Lookup::Inserted(target))
    }

    pub fn get(&self, key: NodeKey) -> Option<&T> {
        self.entries.get(&key)
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeKey, &T)> {
        self.entries.iter().map(|(key, target)| (*key, target))
    }

    pub fn into_map(self) -> HashMap<NodeKey, T> {
        self.entries
    }
}

impl<T: Clone + PartialEq> Default for IdentityTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
