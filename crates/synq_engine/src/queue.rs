//! Durable, bounded queue of pending mutations.
//!
//! The queue is held in memory and rewritten in full to the key-value store
//! after every mutation. Capacity is enforced on every insertion: once the
//! queue exceeds its cap, the oldest items (by enqueue time) are moved to the
//! dead-letter archive with reason [`OVERFLOW_REASON`]. Enqueue never fails
//! for capacity reasons.

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::dead_letter::DeadLetterStore;
use crate::events::{EventBus, SyncEvent};
use crate::model::SyncQueueItem;
use crate::persist::{self, QUEUE_KEY};
use crate::ItemId;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use synq_storage::KeyValueStore;

/// Failure reason recorded on items evicted for capacity.
pub const OVERFLOW_REASON: &str = "Queue overflow";

/// What a drain pass decided for each visited item.
///
/// Items the pass never reached (cancellation) and items enqueued while it
/// ran appear in none of the lists and are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassOutcome {
    /// Items applied (or discarded by a server-wins resolution).
    pub succeeded: Vec<ItemId>,
    /// Items that failed and stay queued, with their new retry count.
    pub retried: Vec<(ItemId, u32)>,
    /// Items that reached the retry ceiling, with their failure reason.
    pub exhausted: Vec<(SyncQueueItem, String)>,
}

impl PassOutcome {
    /// Returns true if the pass decided nothing.
    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.retried.is_empty() && self.exhausted.is_empty()
    }
}

/// The pending-mutation queue.
pub struct SyncQueueStore {
    store: Arc<dyn KeyValueStore>,
    dead_letter: Arc<DeadLetterStore>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    max_size: usize,
    expiry_millis: u64,
    items: Mutex<Vec<SyncQueueItem>>,
}

impl SyncQueueStore {
    /// Creates an empty queue. Call [`load`](Self::load) to read persisted items.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        dead_letter: Arc<DeadLetterStore>,
        events: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            dead_letter,
            events,
            clock,
            max_size: config.max_queue_size,
            expiry_millis: config.queue_expiry_millis(),
            items: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the in-memory queue with the persisted one.
    ///
    /// Items enqueued at or before `now - queue_expiry` are dropped without
    /// being archived. Returns the number of purged items.
    pub fn load(&self) -> usize {
        let mut loaded: Vec<SyncQueueItem> = match persist::read(self.store.as_ref(), QUEUE_KEY) {
            Ok(items) => items.unwrap_or_default(),
            Err(e) => {
                tracing::error!(error = %e, "unreadable sync queue, starting empty");
                Vec::new()
            }
        };

        let mut seen = HashSet::new();
        loaded.retain(|item| seen.insert(item.id.clone()));

        let purged = match self.clock.now_millis().checked_sub(self.expiry_millis) {
            Some(cutoff) => {
                let before = loaded.len();
                loaded.retain(|item| item.enqueued_at > cutoff);
                before - loaded.len()
            }
            None => 0,
        };

        let (pending, overflow) = {
            let mut items = self.items.lock();
            *items = loaded;
            let overflow = self.trim_to_capacity(&mut items);
            if purged > 0 || !overflow.is_empty() {
                self.persist(&items);
            }
            (items.len(), overflow)
        };

        if purged > 0 {
            tracing::warn!(purged, "purged expired queue items");
        }
        tracing::info!(pending, "sync queue loaded");
        self.archive_overflow(overflow);
        self.events.emit(SyncEvent::QueueUpdated { pending });
        purged
    }

    /// Appends an item, evicting the oldest overflow to the dead-letter archive.
    pub fn enqueue(&self, item: SyncQueueItem) {
        tracing::debug!(
            id = %item.id,
            collection = %item.collection,
            operation = %item.operation,
            "enqueue"
        );

        let (pending, overflow) = {
            let mut items = self.items.lock();
            items.push(item);
            let overflow = self.trim_to_capacity(&mut items);
            self.persist(&items);
            (items.len(), overflow)
        };

        self.archive_overflow(overflow);
        self.events.emit(SyncEvent::QueueUpdated { pending });
    }

    /// Re-appends items taken from the dead-letter archive.
    ///
    /// Ids already queued are skipped. Returns the number of restored items
    /// still queued after capacity trimming.
    pub fn restore(&self, restored: Vec<SyncQueueItem>) -> usize {
        if restored.is_empty() {
            return 0;
        }

        let (added, pending, overflow) = {
            let mut items = self.items.lock();
            let mut queued: HashSet<ItemId> = items.iter().map(|i| i.id.clone()).collect();
            let mut fresh: HashSet<ItemId> = HashSet::new();
            for item in restored {
                if queued.insert(item.id.clone()) {
                    fresh.insert(item.id.clone());
                    items.push(item);
                }
            }
            let overflow = self.trim_to_capacity(&mut items);
            let added = fresh.len() - overflow.iter().filter(|i| fresh.contains(&i.id)).count();
            self.persist(&items);
            (added, items.len(), overflow)
        };

        tracing::info!(added, "restored items from dead-letter archive");
        self.archive_overflow(overflow);
        self.events.emit(SyncEvent::QueueUpdated { pending });
        added
    }

    /// Returns the queue in processing order.
    ///
    /// Items are ordered by priority rank, then enqueue time, then insertion
    /// order.
    pub fn snapshot(&self) -> Vec<SyncQueueItem> {
        let mut items = self.items.lock().clone();
        items.sort_by_key(|item| (item.priority, item.enqueued_at));
        items
    }

    /// Applies the decisions of a drain pass.
    ///
    /// Succeeded and exhausted items are removed, retried items get their new
    /// retry count, and exhausted items are archived under their failure
    /// reason. Returns the number of items still queued.
    pub fn apply_outcomes(&self, outcome: PassOutcome) -> usize {
        let PassOutcome {
            succeeded,
            retried,
            exhausted,
        } = outcome;

        let pending = {
            let mut items = self.items.lock();
            let removed: HashSet<&str> = succeeded
                .iter()
                .map(String::as_str)
                .chain(exhausted.iter().map(|(item, _)| item.id.as_str()))
                .collect();
            items.retain(|item| !removed.contains(item.id.as_str()));

            for (id, retry_count) in &retried {
                if let Some(item) = items.iter_mut().find(|item| &item.id == id) {
                    item.retry_count = *retry_count;
                }
            }
            self.persist(&items);
            items.len()
        };

        // Group by reason, keeping first-seen order.
        let mut groups: Vec<(String, Vec<SyncQueueItem>)> = Vec::new();
        for (item, reason) in exhausted {
            match groups.iter_mut().find(|(r, _)| *r == reason) {
                Some((_, group)) => group.push(item),
                None => groups.push((reason, vec![item])),
            }
        }
        for (reason, group) in groups {
            self.dead_letter.append(group, &reason);
        }

        self.events.emit(SyncEvent::QueueUpdated { pending });
        pending
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Returns true if `id` is queued.
    pub fn contains(&self, id: &str) -> bool {
        self.items.lock().iter().any(|item| item.id == id)
    }

    /// Removes the oldest items beyond capacity, preserving the order of the rest.
    fn trim_to_capacity(&self, items: &mut Vec<SyncQueueItem>) -> Vec<SyncQueueItem> {
        let excess = items.len().saturating_sub(self.max_size);
        if excess == 0 {
            return Vec::new();
        }

        let mut by_age: Vec<usize> = (0..items.len()).collect();
        by_age.sort_by_key(|&idx| items[idx].enqueued_at);
        let evicted: HashSet<usize> = by_age.into_iter().take(excess).collect();

        let mut overflow = Vec::with_capacity(excess);
        let mut kept = Vec::with_capacity(self.max_size);
        for (idx, item) in std::mem::take(items).into_iter().enumerate() {
            if evicted.contains(&idx) {
                overflow.push(item);
            } else {
                kept.push(item);
            }
        }
        *items = kept;
        overflow
    }

    fn archive_overflow(&self, overflow: Vec<SyncQueueItem>) {
        if overflow.is_empty() {
            return;
        }
        tracing::warn!(
            evicted = overflow.len(),
            capacity = self.max_size,
            "sync queue over capacity"
        );
        self.dead_letter.append(overflow, OVERFLOW_REASON);
    }

    fn persist(&self, items: &[SyncQueueItem]) {
        if let Err(e) = persist::write(self.store.as_ref(), QUEUE_KEY, items) {
            tracing::error!(error = %e, "failed to persist sync queue");
        }
    }
}

impl std::fmt::Debug for SyncQueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueueStore")
            .field("max_size", &self.max_size)
            .field("len", &self.len())
            .finish()
    }
}
