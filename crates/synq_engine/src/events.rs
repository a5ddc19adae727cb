//! In-process event bus for sync state transitions.
//!
//! Components announce what happened (queue length changed, a pass started
//! or finished, a conflict was resolved, items were dead-lettered) so a UI or
//! telemetry layer can render it. The bus has no persistence; within a topic,
//! listeners observe events in emission order.
//!
//! # Usage
//!
//! ```rust
//! use synq_engine::{EventBus, SyncEvent, Topic};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let bus = EventBus::new();
//! let seen = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&seen);
//! let id = bus.subscribe(Topic::QueueUpdated, move |event| {
//!     if let SyncEvent::QueueUpdated { pending } = event {
//!         counter.store(*pending, Ordering::SeqCst);
//!     }
//! });
//!
//! bus.emit(SyncEvent::QueueUpdated { pending: 3 });
//! assert_eq!(seen.load(Ordering::SeqCst), 3);
//! assert!(bus.unsubscribe(id));
//! ```

use crate::conflict::ConflictStrategy;
use crate::model::Payload;
use crate::{CollectionName, ItemId, Version};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Named event topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Topic {
    /// Online/offline transitions.
    ConnectivityChange,
    /// The number of pending items changed.
    QueueUpdated,
    /// A drain pass started.
    SyncStarted,
    /// A drain pass finished (fully or after cancellation).
    SyncCompleted,
    /// A version conflict was detected and resolved.
    SyncConflict,
    /// Items were moved to the dead-letter store.
    SyncFailed,
}

impl Topic {
    /// Every topic, in declaration order.
    pub const ALL: [Topic; 6] = [
        Topic::ConnectivityChange,
        Topic::QueueUpdated,
        Topic::SyncStarted,
        Topic::SyncCompleted,
        Topic::SyncConflict,
        Topic::SyncFailed,
    ];

    /// The topic's wire name.
    pub fn name(&self) -> &'static str {
        match self {
            Topic::ConnectivityChange => "connectivity-change",
            Topic::QueueUpdated => "queue-updated",
            Topic::SyncStarted => "sync-started",
            Topic::SyncCompleted => "sync-completed",
            Topic::SyncConflict => "sync-conflict",
            Topic::SyncFailed => "sync-failed",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An event with its typed payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SyncEvent {
    /// Connectivity changed.
    ConnectivityChange {
        /// New state.
        online: bool,
    },
    /// Pending count after a queue mutation.
    QueueUpdated {
        /// Items now queued.
        pending: usize,
    },
    /// A drain pass started.
    SyncStarted {
        /// Items queued at pass start.
        pending: usize,
    },
    /// A drain pass finished.
    #[serde(rename_all = "camelCase")]
    SyncCompleted {
        /// Items applied or resolved and removed.
        processed: usize,
        /// Items that failed but remain queued for retry.
        failed: usize,
        /// Items still queued after the pass.
        remaining: usize,
        /// Conflicts resolved during the pass.
        conflicts_resolved: usize,
        /// Whether the pass stopped early.
        cancelled: bool,
    },
    /// A version conflict was resolved.
    #[serde(rename_all = "camelCase")]
    SyncConflict {
        /// Collection of the conflicting row.
        collection: CollectionName,
        /// Queue item that conflicted.
        item_id: ItemId,
        /// Version the client based its change on.
        local_version: Version,
        /// Version currently stored remotely.
        remote_version: Version,
        /// Strategy the resolver chose.
        strategy: ConflictStrategy,
        /// Local mutation payload.
        local_data: Payload,
        /// Remote row data.
        server_data: Payload,
    },
    /// Items were archived in the dead-letter store.
    #[serde(rename_all = "camelCase")]
    SyncFailed {
        /// Archived items.
        item_ids: Vec<ItemId>,
        /// Failure reason recorded on each.
        reason: String,
    },
}

impl SyncEvent {
    /// The topic this event is published on.
    pub fn topic(&self) -> Topic {
        match self {
            SyncEvent::ConnectivityChange { .. } => Topic::ConnectivityChange,
            SyncEvent::QueueUpdated { .. } => Topic::QueueUpdated,
            SyncEvent::SyncStarted { .. } => Topic::SyncStarted,
            SyncEvent::SyncCompleted { .. } => Topic::SyncCompleted,
            SyncEvent::SyncConflict { .. } => Topic::SyncConflict,
            SyncEvent::SyncFailed { .. } => Topic::SyncFailed,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// A topic-keyed publish/subscribe bus.
///
/// The bus:
/// - Delivers each event to the listeners of its topic only
/// - Preserves emission order within a topic
/// - Invokes listeners outside its lock, so listeners may subscribe,
///   unsubscribe or emit
/// - Is thread-safe
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<BTreeMap<Topic, Vec<(SubscriptionId, Listener)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `topic`.
    pub fn subscribe<F>(&self, topic: Topic, listener: F) -> SubscriptionId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(topic)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns `true` if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        for entries in listeners.values_mut() {
            if let Some(pos) = entries.iter().position(|(sid, _)| *sid == id) {
                entries.remove(pos);
                return true;
            }
        }
        false
    }

    /// Delivers `event` to every listener of its topic.
    pub fn emit(&self, event: SyncEvent) {
        let targets: Vec<Listener> = self
            .listeners
            .read()
            .get(&event.topic())
            .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        for listener in targets {
            listener(&event);
        }
    }

    /// Removes every listener.
    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    /// Number of listeners registered for `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.listeners.read().get(&topic).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.read();
        let counts: BTreeMap<&'static str, usize> =
            listeners.iter().map(|(t, l)| (t.name(), l.len())).collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}
