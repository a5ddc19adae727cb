//! In-memory key-value store for testing.

use crate::backend::KeyValueStore;
use crate::error::StorageResult;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// An in-memory key-value store.
///
/// This store keeps all entries in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral clients that don't need persistence
///
/// `save` does no I/O but is counted, so tests can assert that the engine
/// flushed after a mutation.
///
/// # Example
///
/// ```rust
/// use synq_storage::{InMemoryStore, KeyValueStore};
/// use serde_json::json;
///
/// let store = InMemoryStore::new();
/// store.set("cache:user", json!({"name": "Amina"})).unwrap();
/// store.save().unwrap();
/// assert_eq!(store.keys().unwrap(), vec!["cache:user".to_string()]);
/// assert_eq!(store.save_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
    saves: AtomicU64,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with pre-existing entries.
    ///
    /// Useful for testing restart scenarios.
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
            saves: AtomicU64::new(0),
        }
    }

    /// Returns a copy of every entry.
    #[must_use]
    pub fn entries(&self) -> BTreeMap<String, Value> {
        self.entries.read().clone()
    }

    /// Number of times `save` has been called.
    #[must_use]
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of keys held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn save(&self) -> StorageResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
