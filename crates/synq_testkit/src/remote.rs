//! In-memory remote data store.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use synq_engine::{Payload, RemoteDataStore, RemoteError, RemoteResult, RemoteRow};

/// A mutation the remote store accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum AppliedOp {
    /// A row was inserted.
    Insert {
        /// Target collection.
        collection: String,
        /// Inserted data.
        data: Payload,
    },
    /// A row was updated.
    Update {
        /// Target collection.
        collection: String,
        /// Row key.
        key: String,
        /// Written data.
        data: Payload,
    },
    /// A row was deleted.
    Delete {
        /// Target collection.
        collection: String,
        /// Row key.
        key: String,
    },
}

type ApplyHook = Arc<dyn Fn(&AppliedOp) + Send + Sync>;

/// A remote store backed by an in-memory table per collection.
///
/// Rows are keyed by their `id` field. Every accepted mutation is logged.
/// Failures can be scripted for the next N mutations or forced for all of
/// them, and a hook can run after each accepted mutation (for example to
/// flip connectivity mid-pass).
#[derive(Default)]
pub struct MemoryRemoteStore {
    rows: Mutex<BTreeMap<(String, String), RemoteRow>>,
    applied: Mutex<Vec<AppliedOp>>,
    reads: AtomicUsize,
    scripted: Mutex<VecDeque<RemoteError>>,
    always: Mutex<Option<RemoteError>>,
    after_apply: RwLock<Option<ApplyHook>>,
}

impl MemoryRemoteStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a row at `version`.
    pub fn put_row(&self, collection: &str, key: &str, version: u64, data: Payload) {
        self.rows.lock().insert(
            (collection.to_string(), key.to_string()),
            RemoteRow::at_version(version).with_data(data),
        );
    }

    /// Returns the stored row, if any.
    pub fn row(&self, collection: &str, key: &str) -> Option<RemoteRow> {
        self.rows
            .lock()
            .get(&(collection.to_string(), key.to_string()))
            .cloned()
    }

    /// Every accepted mutation, in order.
    pub fn applied(&self) -> Vec<AppliedOp> {
        self.applied.lock().clone()
    }

    /// Number of `read_current` calls.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Fails the next mutation with `error`. Calls stack.
    pub fn fail_next(&self, error: RemoteError) {
        self.scripted.lock().push_back(error);
    }

    /// Fails every mutation with `error` until cleared with `None`.
    pub fn fail_always(&self, error: Option<RemoteError>) {
        *self.always.lock() = error;
    }

    /// Runs `hook` after every accepted mutation.
    pub fn on_apply<F>(&self, hook: F)
    where
        F: Fn(&AppliedOp) + Send + Sync + 'static,
    {
        *self.after_apply.write() = Some(Arc::new(hook));
    }

    fn check_failure(&self) -> RemoteResult<()> {
        if let Some(error) = self.scripted.lock().pop_front() {
            return Err(error);
        }
        match self.always.lock().as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn accept(&self, op: AppliedOp) {
        self.applied.lock().push(op.clone());
        let hook = self.after_apply.read().clone();
        if let Some(hook) = hook {
            hook(&op);
        }
    }
}

fn row_key(data: &Payload) -> Option<String> {
    match data.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl RemoteDataStore for MemoryRemoteStore {
    async fn apply_insert(&self, collection: &str, data: &Payload) -> RemoteResult<()> {
        self.check_failure()?;
        if let Some(key) = row_key(data) {
            let version = data.get("version").and_then(Value::as_u64).unwrap_or(1);
            self.put_row(collection, &key, version, data.clone());
        }
        self.accept(AppliedOp::Insert {
            collection: collection.to_string(),
            data: data.clone(),
        });
        Ok(())
    }

    async fn apply_delete(&self, collection: &str, key: &str) -> RemoteResult<()> {
        self.check_failure()?;
        self.rows
            .lock()
            .remove(&(collection.to_string(), key.to_string()));
        self.accept(AppliedOp::Delete {
            collection: collection.to_string(),
            key: key.to_string(),
        });
        Ok(())
    }

    async fn read_current(&self, collection: &str, key: &str) -> RemoteResult<Option<RemoteRow>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.row(collection, key))
    }

    async fn apply_update(&self, collection: &str, key: &str, data: &Payload) -> RemoteResult<()> {
        self.check_failure()?;
        let mut rows = self.rows.lock();
        let Some(row) = rows.get_mut(&(collection.to_string(), key.to_string())) else {
            return Err(RemoteError::not_found(collection, key));
        };
        row.version = data.get("version").and_then(Value::as_u64).or(row.version);
        row.updated_at = data
            .get("updated_at")
            .and_then(Value::as_str)
            .map(str::to_string);
        for (k, v) in data {
            row.data.insert(k.clone(), v.clone());
        }
        drop(rows);

        self.accept(AppliedOp::Update {
            collection: collection.to_string(),
            key: key.to_string(),
            data: data.clone(),
        });
        Ok(())
    }
}

impl std::fmt::Debug for MemoryRemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRemoteStore")
            .field("rows", &self.rows.lock().len())
            .field("applied", &self.applied.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_then_update() {
        let remote = MemoryRemoteStore::new();
        remote
            .apply_insert("members", &payload(json!({"id": "m1", "name": "Ana"})))
            .await
            .unwrap();
        assert_eq!(remote.row("members", "m1").unwrap().version, Some(1));

        remote
            .apply_update("members", "m1", &payload(json!({"name": "Bea", "version": 2})))
            .await
            .unwrap();
        let row = remote.row("members", "m1").unwrap();
        assert_eq!(row.version, Some(2));
        assert_eq!(row.data["name"], json!("Bea"));
        assert_eq!(remote.applied().len(), 2);
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed() {
        let remote = MemoryRemoteStore::new();
        remote.fail_next(RemoteError::transport("down"));
        assert!(remote.apply_delete("t", "x").await.is_err());
        assert!(remote.apply_delete("t", "x").await.is_ok());
        assert_eq!(remote.applied().len(), 1);
    }

    #[tokio::test]
    async fn hook_runs_after_accept() {
        let remote = MemoryRemoteStore::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        remote.on_apply(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        remote.fail_always(Some(RemoteError::rejected("no")));
        assert!(remote.apply_insert("t", &Payload::new()).await.is_err());
        remote.fail_always(None);
        remote.apply_insert("t", &Payload::new()).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn update_of_missing_row_is_not_found() {
        let remote = MemoryRemoteStore::new();
        let err = remote
            .apply_update("t", "ghost", &Payload::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::NotFound { .. }));
    }
}
