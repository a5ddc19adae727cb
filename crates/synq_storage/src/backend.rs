//! Key-value store trait definition.

use crate::error::StorageResult;
use serde_json::Value;

/// A durable key-value store for Synq.
///
/// Stores hold arbitrary JSON values under string keys. The sync engine uses
/// one store for its queue, dead-letter list, last-sync timestamp and cache
/// entries, so implementations must tolerate concurrent access from several
/// components.
///
/// # Invariants
///
/// - `get` returns the value most recently passed to `set` for that key,
///   or `None` after `delete`
/// - `save` makes every preceding `set`/`delete` durable
/// - A failed `save` leaves the previously saved state intact
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or cannot be read.
    fn get(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// The write is visible to `get` immediately but only durable after
    /// [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or rejects the write.
    fn set(&self, key: &str, value: Value) -> StorageResult<()>;

    /// Removes `key`. Returns `true` if a value was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or rejects the write.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Returns every key currently held, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed.
    fn keys(&self) -> StorageResult<Vec<String>>;

    /// Flushes all pending mutations to durable storage.
    ///
    /// After this returns successfully, all previous writes are guaranteed
    /// to survive process termination.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn save(&self) -> StorageResult<()>;
}
