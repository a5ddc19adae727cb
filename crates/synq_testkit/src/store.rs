//! Key-value store with injectable write failures.

use serde_json::Value;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use synq_storage::{FileStore, InMemoryStore, KeyValueStore, StorageError, StorageResult};
use tempfile::TempDir;

/// A file store in a private temporary directory.
///
/// The directory is removed when this value is dropped; reopen the same
/// document with [`reopen`](Self::reopen) to simulate a process restart.
pub struct TempFileStore {
    dir: TempDir,
    /// The open store.
    pub store: Arc<FileStore>,
}

impl TempFileStore {
    /// Creates an empty document at `<tempdir>/sync.json`.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(FileStore::open(&dir.path().join("sync.json")).expect("open failed"));
        Self { dir, store }
    }

    /// Path of the document.
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("sync.json")
    }

    /// Drops the current handle and opens the document again from disk.
    pub fn reopen(&mut self) -> Arc<FileStore> {
        self.store = Arc::new(FileStore::open(&self.path()).expect("reopen failed"));
        Arc::clone(&self.store)
    }
}

impl Default for TempFileStore {
    fn default() -> Self {
        Self::new()
    }
}

/// An in-memory store whose `set`, `delete` and `save` can be made to fail.
///
/// Reads always succeed, so tests can check that in-memory engine state
/// stays consistent while persistence is broken.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    failing: AtomicBool,
}

impl FlakyStore {
    /// Creates a healthy store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// The wrapped store.
    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    fn check(&self) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StorageError::Io(io::Error::other("injected write failure")))
        } else {
            Ok(())
        }
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        self.check()?;
        self.inner.set(key, value)
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        self.check()?;
        self.inner.delete(key)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        self.inner.keys()
    }

    fn save(&self) -> StorageResult<()> {
        self.check()?;
        self.inner.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failing_blocks_writes_only() {
        let store = FlakyStore::new();
        store.set("a", json!(1)).unwrap();
        store.set_failing(true);
        assert!(store.set("b", json!(2)).is_err());
        assert!(store.save().is_err());
        assert_eq!(store.get("a").unwrap(), Some(json!(1)));
        store.set_failing(false);
        assert!(store.delete("a").unwrap());
    }

    #[test]
    fn temp_store_reopens_from_disk() {
        let mut temp = TempFileStore::new();
        temp.store.set("a", json!(1)).unwrap();
        temp.store.set("b", json!(2)).unwrap();
        temp.store.save().unwrap();
        temp.store.set("b", json!(3)).unwrap();

        let store = temp.reopen();
        assert_eq!(store.get("a").unwrap(), Some(json!(1)));
        assert_eq!(store.get("b").unwrap(), Some(json!(2)));
        assert!(temp.path().exists());
    }
}
