//! Dead-letter archive for items the engine gave up on.

use crate::clock::Clock;
use crate::events::{EventBus, SyncEvent};
use crate::model::{DeadLetterItem, SyncQueueItem};
use crate::persist::{self, DEAD_LETTER_KEY};
use crate::ItemId;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use synq_storage::KeyValueStore;

/// A bounded archive of failed or evicted queue items.
///
/// Entries are kept in arrival order; once the archive exceeds its capacity
/// the oldest entries are evicted. Every mutation rewrites the persisted
/// archive. Persistence failures are logged and the in-memory archive stays
/// authoritative.
pub struct DeadLetterStore {
    store: Arc<dyn KeyValueStore>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    capacity: usize,
    items: Mutex<Vec<DeadLetterItem>>,
}

impl DeadLetterStore {
    /// Creates an empty archive. Call [`load`](Self::load) to read persisted entries.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        events: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        capacity: usize,
    ) -> Self {
        Self {
            store,
            events,
            clock,
            capacity,
            items: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the in-memory archive with the persisted one.
    ///
    /// Returns the number of entries loaded.
    pub fn load(&self) -> usize {
        let mut loaded: Vec<DeadLetterItem> =
            match persist::read(self.store.as_ref(), DEAD_LETTER_KEY) {
                Ok(items) => items.unwrap_or_default(),
                Err(e) => {
                    tracing::error!(error = %e, "unreadable dead-letter archive, starting empty");
                    Vec::new()
                }
            };

        let mut seen = HashSet::new();
        loaded.retain(|d| seen.insert(d.item.id.clone()));
        let excess = loaded.len().saturating_sub(self.capacity);
        loaded.drain(..excess);

        let count = loaded.len();
        *self.items.lock() = loaded;
        tracing::debug!(count, "loaded dead-letter archive");
        count
    }

    /// Archives `items` with a shared failure reason.
    ///
    /// Emits `sync-failed` with the archived ids.
    pub fn append(&self, items: Vec<SyncQueueItem>, reason: &str) {
        if items.is_empty() {
            return;
        }

        let failed_at = self.clock.now_millis();
        let item_ids: Vec<ItemId> = items.iter().map(|i| i.id.clone()).collect();
        {
            let mut archive = self.items.lock();
            archive.retain(|d| !item_ids.contains(&d.item.id));
            archive.extend(
                items
                    .into_iter()
                    .map(|item| DeadLetterItem::new(item, reason, failed_at)),
            );

            let excess = archive.len().saturating_sub(self.capacity);
            if excess > 0 {
                archive.drain(..excess);
                tracing::debug!(evicted = excess, "dead-letter archive trimmed");
            }
            self.persist(&archive);
        }

        tracing::warn!(count = item_ids.len(), reason, "items moved to dead-letter archive");
        self.events.emit(SyncEvent::SyncFailed {
            item_ids,
            reason: reason.to_string(),
        });
    }

    /// Removes entries and returns them ready to be re-queued.
    ///
    /// With `None` every entry is taken. Returned items have their retry
    /// counter reset and their failure annotations dropped. Unknown ids are
    /// ignored.
    pub fn take(&self, ids: Option<&[ItemId]>) -> Vec<SyncQueueItem> {
        let mut archive = self.items.lock();
        let taken: Vec<DeadLetterItem> = match ids {
            None => std::mem::take(&mut *archive),
            Some(ids) => {
                let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *archive)
                    .into_iter()
                    .partition(|d| ids.contains(&d.item.id));
                *archive = kept;
                taken
            }
        };

        if !taken.is_empty() {
            self.persist(&archive);
        }
        taken.into_iter().map(DeadLetterItem::into_retry).collect()
    }

    /// Returns a copy of every entry, oldest first.
    pub fn list(&self) -> Vec<DeadLetterItem> {
        self.items.lock().clone()
    }

    /// Number of archived entries.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns true if nothing is archived.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Returns true if `id` is archived.
    pub fn contains(&self, id: &str) -> bool {
        self.items.lock().iter().any(|d| d.item.id == id)
    }

    fn persist(&self, archive: &[DeadLetterItem]) {
        if let Err(e) = persist::write(self.store.as_ref(), DEAD_LETTER_KEY, archive) {
            tracing::error!(error = %e, "failed to persist dead-letter archive");
        }
    }
}

impl std::fmt::Debug for DeadLetterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadLetterStore")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
