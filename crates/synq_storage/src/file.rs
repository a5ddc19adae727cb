//! File-backed key-value store for persistent storage.

use crate::backend::KeyValueStore;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Default)]
struct FileState {
    entries: Map<String, Value>,
    dirty: bool,
}

/// A key-value store persisted as a single JSON document.
///
/// Entries are loaded on [`open`](Self::open) and held in memory. Mutations
/// mark the store dirty; [`save`](KeyValueStore::save) rewrites the whole
/// document.
///
/// # Durability
///
/// `save()` writes a sibling `*.tmp` file, calls `File::sync_all()` on it and
/// renames it over the target. A crash mid-save leaves either the old or the
/// new document, never a torn one.
///
/// # Example
///
/// ```no_run
/// use synq_storage::{FileStore, KeyValueStore};
/// use serde_json::json;
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("offline-data.json")).unwrap();
/// store.set("last-sync-timestamp", json!(0)).unwrap();
/// store.save().unwrap(); // Ensure data is durable
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: RwLock<FileState>,
}

impl FileStore {
    /// Opens the document at `path`, or starts empty if it doesn't exist.
    ///
    /// The file itself is only created by the first `save`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not contain a
    /// JSON object.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let entries = match fs::read(path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Map::new(),
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(map)) => map,
                Ok(other) => {
                    return Err(StorageError::Corrupted(format!(
                        "expected a JSON object at the document root, found {}",
                        json_kind(&other)
                    )))
                }
                Err(e) => return Err(StorageError::Corrupted(e.to_string())),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), keys = entries.len(), "opened file store");

        Ok(Self {
            path: path.to_path_buf(),
            state: RwLock::new(FileState {
                entries,
                dirty: false,
            }),
        })
    }

    /// Opens the document, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot
    /// be read.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the underlying document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if there are mutations not yet saved.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.state.read().dirty
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.state.read().entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        let mut state = self.state.write();
        state.entries.insert(key.to_string(), value);
        state.dirty = true;
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut state = self.state.write();
        let removed = state.entries.remove(key).is_some();
        state.dirty |= removed;
        Ok(removed)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.state.read().entries.keys().cloned().collect())
    }

    fn save(&self) -> StorageResult<()> {
        // Held for the whole write so concurrent saves serialize.
        let mut state = self.state.write();
        if !state.dirty && self.path.exists() {
            return Ok(());
        }

        let bytes = serde_json::to_vec_pretty(&state.entries)?;
        let tmp = self.temp_path();
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        state.dirty = false;
        debug!(path = %self.path.display(), bytes = bytes.len(), "saved file store");
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn file_open_missing_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::open(&path).unwrap();
        assert!(store.keys().unwrap().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        // Write data
        {
            let store = FileStore::open(&path).unwrap();
            store.set("sync-queue", json!([{"id": "a"}])).unwrap();
            store.set("last-sync-timestamp", json!(42)).unwrap();
            store.save().unwrap();
        }

        // Reopen and read
        {
            let store = FileStore::open(&path).unwrap();
            assert_eq!(store.get("sync-queue").unwrap(), Some(json!([{"id": "a"}])));
            assert_eq!(store.get("last-sync-timestamp").unwrap(), Some(json!(42)));
        }
    }

    #[test]
    fn file_unsaved_writes_are_not_durable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.set("a", json!(1)).unwrap();
            store.save().unwrap();
            store.set("b", json!(2)).unwrap();
            assert!(store.is_dirty());
        }

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(json!(1)));
        assert_eq!(store.get("b").unwrap(), None);
    }

    #[test]
    fn file_delete_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::open(&path).unwrap();
        store.set("cache:x", json!("v")).unwrap();
        store.save().unwrap();
        assert!(store.delete("cache:x").unwrap());
        store.save().unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("cache:x").unwrap(), None);
    }

    #[test]
    fn file_corrupt_document_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, b"{not json").unwrap();

        let result = FileStore::open(&path);
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn file_non_object_root_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, b"[1, 2, 3]").unwrap();

        let result = FileStore::open(&path);
        assert!(matches!(result, Err(StorageError::Corrupted(msg)) if msg.contains("an array")));
    }

    #[test]
    fn file_empty_document_is_empty_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, b"  \n").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn file_save_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::open(&path).unwrap();
        store.set("a", json!(1)).unwrap();
        store.save().unwrap();

        assert!(path.exists());
        assert!(!dir.path().join("store.json.tmp").exists());
        assert!(!store.is_dirty());
    }

    #[test]
    fn file_create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("path").join("store.json");

        let store = FileStore::open_with_create_dirs(&path).unwrap();
        store.save().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn file_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.path(), path);
    }

    proptest::proptest! {
        #[test]
        fn file_reopen_preserves_entries(
            entries in proptest::collection::btree_map("[a-z:-]{1,12}", proptest::num::i64::ANY, 0..20)
        ) {
            let dir = tempdir().unwrap();
            let path = dir.path().join("store.json");
            {
                let store = FileStore::open(&path).unwrap();
                for (key, value) in &entries {
                    store.set(key, json!(value)).unwrap();
                }
                store.save().unwrap();
            }

            let store = FileStore::open(&path).unwrap();
            let keys = store.keys().unwrap();
            proptest::prop_assert_eq!(keys.len(), entries.len());
            for (key, value) in &entries {
                proptest::prop_assert_eq!(store.get(key).unwrap(), Some(json!(value)));
            }
        }
    }
}
