//! Queue draining: apply, detect conflicts, count retries.

use crate::clock::{to_rfc3339, Clock};
use crate::config::EngineConfig;
use crate::conflict::{Conflict, ConflictResolver, PolicyResolver, Resolution};
use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::model::{Operation, SyncQueueItem};
use crate::persist::{self, LAST_SYNC_KEY};
use crate::queue::{PassOutcome, SyncQueueStore};
use crate::remote::{RemoteDataStore, RemoteError};
use crate::Timestamp;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use synq_storage::KeyValueStore;

/// Field stamped on every update with the write time.
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// Cancellation signal for a drain pass.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was signalled.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Items applied or resolved and removed.
    pub processed: usize,
    /// Items that failed and stay queued for another attempt.
    pub failed: usize,
    /// Items that reached the retry ceiling and were archived.
    pub dead_lettered: usize,
    /// Items still queued after the pass.
    pub remaining: usize,
    /// Conflicts resolved during the pass.
    pub conflicts_resolved: usize,
    /// Whether the pass stopped before visiting every item.
    pub cancelled: bool,
    /// When the pass finished (milliseconds since epoch).
    pub completed_at: Timestamp,
}

impl SyncReport {
    /// Returns true if items were left queued after failing.
    pub fn needs_retry(&self) -> bool {
        self.failed > 0
    }
}

/// Cumulative counters across passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Passes run to completion or cancellation.
    pub passes_completed: u64,
    /// Passes that stopped early.
    pub passes_cancelled: u64,
    /// Items applied or resolved.
    pub items_processed: u64,
    /// Failed attempts that left the item queued.
    pub retries: u64,
    /// Items archived after reaching the retry ceiling.
    pub dead_lettered: u64,
    /// Conflicts resolved.
    pub conflicts_resolved: u64,
    /// Most recent per-item failure.
    pub last_error: Option<String>,
}

/// How a single item was settled.
enum Applied {
    Written,
    Resolved,
}

/// Drains the queue against the remote store.
///
/// At most one pass runs at a time; overlapping triggers return `None`
/// immediately. Remote calls are awaited one at a time in queue order.
pub struct SyncProcessor {
    config: EngineConfig,
    queue: Arc<SyncQueueStore>,
    remote: Arc<dyn RemoteDataStore>,
    resolver: Arc<dyn ConflictResolver>,
    connectivity: Arc<ConnectivityMonitor>,
    events: Arc<EventBus>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    in_progress: AtomicBool,
    token: Mutex<Option<CancelToken>>,
    last_sync: Mutex<Option<Timestamp>>,
    last_conflicts: Mutex<usize>,
    stats: RwLock<SyncStats>,
}

/// Clears the in-progress flag and token when a pass ends, including when
/// its future is dropped mid-await.
struct PassGuard<'a> {
    processor: &'a SyncProcessor,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        *self.processor.token.lock() = None;
        self.processor.in_progress.store(false, Ordering::SeqCst);
    }
}

impl SyncProcessor {
    /// Creates a processor with the default server-wins resolver.
    pub fn new(
        config: EngineConfig,
        queue: Arc<SyncQueueStore>,
        remote: Arc<dyn RemoteDataStore>,
        connectivity: Arc<ConnectivityMonitor>,
        events: Arc<EventBus>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            queue,
            remote,
            resolver: Arc::new(PolicyResolver::default()),
            connectivity,
            events,
            store,
            clock,
            in_progress: AtomicBool::new(false),
            token: Mutex::new(None),
            last_sync: Mutex::new(None),
            last_conflicts: Mutex::new(0),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Replaces the conflict resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Reads the persisted last-sync timestamp.
    pub fn load(&self) {
        match persist::read::<Timestamp>(self.store.as_ref(), LAST_SYNC_KEY) {
            Ok(ts) => *self.last_sync.lock() = ts,
            Err(e) => tracing::error!(error = %e, "unreadable last-sync timestamp"),
        }
    }

    /// Runs one drain pass.
    ///
    /// Returns `None` without doing anything if offline, already draining,
    /// or the queue is empty.
    pub async fn process_queue(&self) -> Option<SyncReport> {
        if !self.connectivity.is_online() || self.queue.is_empty() {
            return None;
        }
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("drain already in progress");
            return None;
        }
        let guard = PassGuard { processor: self };

        let token = CancelToken::new();
        *self.token.lock() = Some(token.clone());

        let snapshot = self.queue.snapshot();
        tracing::info!(pending = snapshot.len(), "sync pass started");
        self.events.emit(SyncEvent::SyncStarted {
            pending: snapshot.len(),
        });

        let mut outcome = PassOutcome::default();
        let mut report = SyncReport::default();
        let mut last_error = None;

        for item in snapshot {
            if token.is_cancelled() || !self.connectivity.is_online() {
                report.cancelled = true;
                break;
            }

            match self.sync_item(&item).await {
                Ok(applied) => {
                    if matches!(applied, Applied::Resolved) {
                        report.conflicts_resolved += 1;
                    }
                    report.processed += 1;
                    outcome.succeeded.push(item.id);
                }
                Err(e) => {
                    let retry_count = item.retry_count.saturating_add(1);
                    let reason = e.to_string();
                    if retry_count < self.config.max_retries && e.is_retryable() {
                        tracing::warn!(id = %item.id, retry_count, error = %reason, "sync item failed");
                        report.failed += 1;
                        outcome.retried.push((item.id, retry_count));
                    } else {
                        tracing::error!(id = %item.id, retry_count, error = %reason, "sync item exhausted retries");
                        report.dead_lettered += 1;
                        let mut item = item;
                        item.retry_count = retry_count;
                        outcome.exhausted.push((item, reason.clone()));
                    }
                    last_error = Some(reason);
                }
            }
        }

        report.remaining = self.queue.apply_outcomes(outcome);

        let now = self.clock.now_millis();
        report.completed_at = now;
        if let Err(e) = persist::write(self.store.as_ref(), LAST_SYNC_KEY, &now) {
            tracing::error!(error = %e, "failed to persist last-sync timestamp");
        }
        *self.last_sync.lock() = Some(now);
        *self.last_conflicts.lock() = report.conflicts_resolved;
        self.record(&report, last_error);

        drop(guard);

        tracing::info!(
            processed = report.processed,
            failed = report.failed,
            dead_lettered = report.dead_lettered,
            remaining = report.remaining,
            conflicts = report.conflicts_resolved,
            cancelled = report.cancelled,
            "sync pass finished"
        );
        self.events.emit(SyncEvent::SyncCompleted {
            processed: report.processed,
            failed: report.failed,
            remaining: report.remaining,
            conflicts_resolved: report.conflicts_resolved,
            cancelled: report.cancelled,
        });
        Some(report)
    }

    /// Signals the running pass, if any, to stop before its next item.
    ///
    /// Returns true if a pass was running.
    pub fn cancel(&self) -> bool {
        match self.token.lock().as_ref() {
            Some(token) => {
                tracing::info!("cancelling sync pass");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Returns true while a pass is running.
    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Completion time of the most recent pass.
    pub fn last_sync_timestamp(&self) -> Option<Timestamp> {
        *self.last_sync.lock()
    }

    /// Conflicts resolved during the most recent pass.
    pub fn conflicts_resolved(&self) -> usize {
        *self.last_conflicts.lock()
    }

    /// Cumulative counters.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    fn record(&self, report: &SyncReport, last_error: Option<String>) {
        let mut stats = self.stats.write();
        stats.passes_completed += 1;
        if report.cancelled {
            stats.passes_cancelled += 1;
        }
        stats.items_processed += report.processed as u64;
        stats.retries += report.failed as u64;
        stats.dead_lettered += report.dead_lettered as u64;
        stats.conflicts_resolved += report.conflicts_resolved as u64;
        if last_error.is_some() {
            stats.last_error = last_error;
        }
    }

    async fn sync_item(&self, item: &SyncQueueItem) -> SyncResult<Applied> {
        tracing::debug!(
            id = %item.id,
            collection = %item.collection,
            operation = %item.operation,
            "applying item"
        );

        match item.operation {
            Operation::Insert => {
                self.remote
                    .apply_insert(&item.collection, &item.payload)
                    .await?;
                Ok(Applied::Written)
            }
            Operation::Delete => {
                let key = self.record_key(item)?;
                self.remote.apply_delete(&item.collection, &key).await?;
                Ok(Applied::Written)
            }
            Operation::Update => self.sync_update(item).await,
        }
    }

    async fn sync_update(&self, item: &SyncQueueItem) -> SyncResult<Applied> {
        let key = self.record_key(item)?;
        let current = self
            .remote
            .read_current(&item.collection, &key)
            .await?
            .ok_or_else(|| RemoteError::not_found(&item.collection, &key))?;

        let mut data = item.payload.clone();
        let mut applied = Applied::Written;

        if let Some(remote_version) = current.version.filter(|v| *v > item.base_version) {
            let resolution = self.resolver.resolve(&Conflict {
                item,
                remote: &current,
                local_version: item.base_version,
                remote_version,
            });
            let strategy = resolution.strategy();

            tracing::warn!(
                collection = %item.collection,
                id = %item.id,
                local_version = item.base_version,
                remote_version,
                %strategy,
                "sync conflict"
            );
            self.events.emit(SyncEvent::SyncConflict {
                collection: item.collection.clone(),
                item_id: item.id.clone(),
                local_version: item.base_version,
                remote_version,
                strategy,
                local_data: item.payload.clone(),
                server_data: current.data.clone(),
            });

            match resolution {
                Resolution::ServerWins => return Ok(Applied::Resolved),
                Resolution::ClientWins => {}
                Resolution::Manual { merged } => data = merged,
            }
            applied = Applied::Resolved;
        }

        let next_version = item
            .base_version
            .max(current.version.unwrap_or_default())
            .saturating_add(1);
        data.insert(self.config.version_field.clone(), Value::from(next_version));
        data.insert(
            UPDATED_AT_FIELD.to_string(),
            Value::String(to_rfc3339(self.clock.now_millis())),
        );

        self.remote
            .apply_update(&item.collection, &key, &data)
            .await?;
        Ok(applied)
    }

    fn record_key(&self, item: &SyncQueueItem) -> SyncResult<String> {
        item.record_key(&self.config.key_field).ok_or_else(|| {
            SyncError::invalid_payload(format!(
                "{} requires field '{}'",
                item.operation, self.config.key_field
            ))
        })
    }
}

impl std::fmt::Debug for SyncProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncProcessor")
            .field("in_progress", &self.is_in_progress())
            .field("last_sync", &self.last_sync_timestamp())
            .finish()
    }
}
