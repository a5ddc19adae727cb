//! Keys and helpers for state kept in the durable key-value store.

use crate::error::SyncResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use synq_storage::KeyValueStore;

/// Key holding the pending queue.
pub const QUEUE_KEY: &str = "sync-queue";

/// Key holding the dead-letter archive.
pub const DEAD_LETTER_KEY: &str = "dead-letter";

/// Key holding the completion time of the last drain pass.
pub const LAST_SYNC_KEY: &str = "last-sync-timestamp";

/// Prefix of every cache entry key.
pub const CACHE_PREFIX: &str = "cache:";

/// Store key for a cache entry.
pub fn cache_key(key: &str) -> String {
    format!("{CACHE_PREFIX}{key}")
}

/// Reads and decodes `key`, returning `None` when it is absent.
pub(crate) fn read<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> SyncResult<Option<T>> {
    match store.get(key)? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Encodes `value` under `key` and flushes the store.
pub(crate) fn write<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> SyncResult<()> {
    store.set(key, serde_json::to_value(value)?)?;
    store.save()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use synq_storage::{InMemoryStore, KeyValueStore};

    #[test]
    fn cache_keys_are_prefixed() {
        assert_eq!(cache_key("roster"), "cache:roster");
    }

    #[test]
    fn write_then_read() {
        let store = InMemoryStore::new();
        write(&store, LAST_SYNC_KEY, &42u64).unwrap();
        assert_eq!(read::<u64>(&store, LAST_SYNC_KEY).unwrap(), Some(42));
        assert_eq!(store.save_count(), 1);
        assert_eq!(read::<u64>(&store, "missing").unwrap(), None);
    }

    #[test]
    fn read_wrong_shape_is_error() {
        let store = InMemoryStore::new();
        store.set(QUEUE_KEY, serde_json::json!("not a list")).unwrap();
        assert!(read::<Vec<u64>>(&store, QUEUE_KEY).is_err());
    }
}
