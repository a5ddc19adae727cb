//! Connectivity tracking.

use crate::events::{EventBus, SyncEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Tracks whether the client can currently reach the remote store.
///
/// Transitions are published as `connectivity-change` events; repeated
/// reports of the same state are ignored.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    online: AtomicBool,
    events: Arc<EventBus>,
}

impl ConnectivityMonitor {
    /// Creates a monitor with an initial state.
    pub fn new(initial_online: bool, events: Arc<EventBus>) -> Self {
        Self {
            online: AtomicBool::new(initial_online),
            events,
        }
    }

    /// Returns the last reported state.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Records a new state. Returns `true` if it was a transition.
    pub fn set_online(&self, online: bool) -> bool {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return false;
        }

        tracing::info!(online, "connectivity changed");
        self.events.emit(SyncEvent::ConnectivityChange { online });
        true
    }
}
