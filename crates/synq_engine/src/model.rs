//! Queue and dead-letter item types.

use crate::{CollectionName, ItemId, Timestamp, Version};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Arbitrary collection-specific mutation data.
///
/// Schemas are validated by the remote store, never by the engine.
pub type Payload = serde_json::Map<String, Value>;

/// Field read for an item's optimistic-concurrency baseline.
pub const DEFAULT_VERSION_FIELD: &str = "version";

/// Field identifying the target row for updates and deletes.
pub const DEFAULT_KEY_FIELD: &str = "id";

/// Kind of mutation carried by a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Create a new row.
    Insert,
    /// Modify an existing row (version checked).
    Update,
    /// Remove a row.
    Delete,
}

impl Operation {
    /// Returns true if the operation targets an existing row and therefore
    /// needs an identifying key in its payload.
    pub fn requires_key(&self) -> bool {
        matches!(self, Operation::Update | Operation::Delete)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.pad(name)
    }
}

/// Processing priority, fixed at enqueue time.
///
/// Ordering follows rank: `High < Normal < Low`, so an ascending sort puts
/// urgent mutations first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Attempted before everything else.
    High,
    /// The default class.
    #[default]
    Normal,
    /// Attempted last.
    Low,
}

/// A pending mutation waiting to be applied to the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    /// Unique identifier, assigned at enqueue time
    pub id: ItemId,
    /// Target collection
    pub collection: CollectionName,
    /// Kind of mutation
    pub operation: Operation,
    /// Data to write, or the identifying key for deletes
    pub payload: Payload,
    /// Creation time (milliseconds since epoch)
    pub enqueued_at: Timestamp,
    /// Failed apply attempts so far
    #[serde(default)]
    pub retry_count: u32,
    /// Processing priority
    #[serde(default)]
    pub priority: Priority,
    /// Version the client believed current when queueing an update
    #[serde(default = "default_base_version")]
    pub base_version: Version,
}

fn default_base_version() -> Version {
    1
}

impl SyncQueueItem {
    /// Creates a new item with a fresh UUID and no retries.
    ///
    /// The base version is read from the payload's `version` field and
    /// defaults to 1.
    pub fn new(
        collection: impl Into<CollectionName>,
        operation: Operation,
        payload: Payload,
        priority: Priority,
        enqueued_at: Timestamp,
    ) -> Self {
        let base_version = base_version_of(&payload, DEFAULT_VERSION_FIELD);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            collection: collection.into(),
            operation,
            payload,
            enqueued_at,
            retry_count: 0,
            priority,
            base_version,
        }
    }

    /// Overrides the generated identifier.
    pub fn with_id(mut self, id: impl Into<ItemId>) -> Self {
        self.id = id.into();
        self
    }

    /// Overrides the optimistic-concurrency baseline.
    pub fn with_base_version(mut self, version: Version) -> Self {
        self.base_version = version;
        self
    }

    /// Returns the identifying key of the target row, if the payload has one.
    ///
    /// String and integer keys are accepted; integers are rendered in decimal.
    pub fn record_key(&self, key_field: &str) -> Option<String> {
        match self.payload.get(key_field)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Age of the item relative to `now`, saturating at zero.
    pub fn age(&self, now: Timestamp) -> Timestamp {
        now.saturating_sub(self.enqueued_at)
    }
}

/// Reads an optimistic-concurrency baseline from a payload, defaulting to 1.
///
/// Zero counts as unversioned, so it also yields 1.
pub fn base_version_of(payload: &Payload, version_field: &str) -> Version {
    payload
        .get(version_field)
        .and_then(Value::as_u64)
        .filter(|v| *v > 0)
        .unwrap_or_else(default_base_version)
}

/// A queue item that exhausted its retries or was evicted for capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterItem {
    /// The item as it was when it failed
    #[serde(flatten)]
    pub item: SyncQueueItem,
    /// Last error message, or the eviction reason
    pub failure_reason: String,
    /// When the item was archived (milliseconds since epoch)
    pub failed_at: Timestamp,
}

impl DeadLetterItem {
    /// Archives `item` with a failure annotation.
    pub fn new(item: SyncQueueItem, failure_reason: impl Into<String>, failed_at: Timestamp) -> Self {
        Self {
            item,
            failure_reason: failure_reason.into(),
            failed_at,
        }
    }

    /// Identifier of the archived item.
    pub fn id(&self) -> &str {
        &self.item.id
    }

    /// Strips the failure annotations and resets the retry counter.
    pub fn into_retry(self) -> SyncQueueItem {
        let mut item = self.item;
        item.retry_count = 0;
        item
    }
}

/// Observable sync status.
///
/// Only `last_sync_timestamp` is persisted; the rest is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Completion time of the most recent pass, if any
    pub last_sync_timestamp: Option<Timestamp>,
    /// Items currently queued
    pub pending_changes: usize,
    /// Whether a drain pass is running
    pub sync_in_progress: bool,
    /// Conflicts resolved during the most recent pass
    pub conflicts_resolved: usize,
}
