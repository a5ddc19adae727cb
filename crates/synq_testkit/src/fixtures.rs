//! Engine fixtures.
//!
//! [`TestEngine`] wires a [`SyncEngine`] to an in-memory store, an in-memory
//! remote, a manual clock and an event recorder. Auto-sync is off so tests
//! decide exactly when a pass runs.

use crate::remote::MemoryRemoteStore;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use synq_engine::{
    CryptoProvider, EngineConfig, EventBus, ManualClock, Operation, Payload, Priority,
    SyncEngine, SyncEvent, SyncQueueItem, Topic,
};
use synq_storage::{InMemoryStore, KeyValueStore};

/// Clock start for fixtures: 2024-02-01T00:00:00Z.
pub const START_MILLIS: u64 = 1_706_745_600_000;

/// One day in milliseconds.
pub const DAY_MILLIS: u64 = 24 * 60 * 60 * 1000;

/// Converts a JSON object literal into a payload.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("payload must be a JSON object, got {other}"),
    }
}

/// Builds a queue item with a fixed id.
pub fn queue_item(id: &str, operation: Operation, priority: Priority, enqueued_at: u64) -> SyncQueueItem {
    SyncQueueItem::new("members", operation, Payload::new(), priority, enqueued_at).with_id(id)
}

/// Records every event published on a bus.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<SyncEvent>>>,
}

impl EventLog {
    /// Subscribes to every topic of `bus`.
    pub fn attach(bus: &EventBus) -> Self {
        let log = Self::default();
        for topic in Topic::ALL {
            let sink = Arc::clone(&log.events);
            bus.subscribe(topic, move |event| sink.lock().push(event.clone()));
        }
        log
    }

    /// Every recorded event, in emission order.
    pub fn all(&self) -> Vec<SyncEvent> {
        self.events.lock().clone()
    }

    /// Recorded events of one topic.
    pub fn of(&self, topic: Topic) -> Vec<SyncEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.topic() == topic)
            .cloned()
            .collect()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// A sync engine over in-memory collaborators.
pub struct TestEngine {
    /// The engine under test.
    pub engine: SyncEngine,
    /// Durable store shared across restarts.
    pub store: Arc<InMemoryStore>,
    /// Remote store shared across restarts.
    pub remote: Arc<MemoryRemoteStore>,
    /// Clock shared across restarts.
    pub clock: ManualClock,
    /// Events published by this engine instance.
    pub events: EventLog,
    config: EngineConfig,
    crypto: Option<Arc<dyn CryptoProvider>>,
}

impl TestEngine {
    /// An online engine with default limits.
    pub fn online() -> Self {
        Self::with_config(EngineConfig::new())
    }

    /// An offline engine with default limits.
    pub fn offline() -> Self {
        Self::with_config(EngineConfig::new().with_initial_online(false))
    }

    /// An engine with `config`; auto-sync is always disabled.
    pub fn with_config(config: EngineConfig) -> Self {
        Self::start(
            Arc::new(InMemoryStore::new()),
            Arc::new(MemoryRemoteStore::new()),
            ManualClock::new(START_MILLIS),
            config,
            None,
        )
    }

    /// An engine that encrypts its cache with `crypto`.
    pub fn with_crypto(crypto: Arc<dyn CryptoProvider>) -> Self {
        Self::start(
            Arc::new(InMemoryStore::new()),
            Arc::new(MemoryRemoteStore::new()),
            ManualClock::new(START_MILLIS),
            EngineConfig::new(),
            Some(crypto),
        )
    }

    /// Disposes this engine and builds a new one over the same store,
    /// remote and clock, as after a process restart.
    pub fn restart(self) -> Self {
        self.engine.dispose();
        Self::start(self.store, self.remote, self.clock, self.config, self.crypto)
    }

    /// Seeds the durable store before the engine loads.
    pub fn restart_with(self, seed: impl FnOnce(&InMemoryStore)) -> Self {
        self.engine.dispose();
        seed(&self.store);
        Self::start(self.store, self.remote, self.clock, self.config, self.crypto)
    }

    /// Queues an insert of `{"id": id}` and returns the queue item id.
    pub fn queue_insert(&self, id: &str, priority: Priority) -> String {
        self.engine
            .queue_change(
                "members",
                Operation::Insert,
                payload(serde_json::json!({ "id": id })),
                priority,
            )
            .expect("queue_change failed")
    }

    /// Reads a raw value from the durable store.
    pub fn stored(&self, key: &str) -> Option<Value> {
        self.store.get(key).expect("in-memory store read failed")
    }

    fn start(
        store: Arc<InMemoryStore>,
        remote: Arc<MemoryRemoteStore>,
        clock: ManualClock,
        config: EngineConfig,
        crypto: Option<Arc<dyn CryptoProvider>>,
    ) -> Self {
        let config = config.with_auto_sync(false);
        let bus = Arc::new(EventBus::new());
        let events = EventLog::attach(&bus);

        let mut builder = SyncEngine::builder(store.clone(), remote.clone())
            .config(config.clone())
            .clock(Arc::new(clock.clone()))
            .event_bus(bus);
        if let Some(crypto) = &crypto {
            builder = builder.crypto(Arc::clone(crypto));
        }

        Self {
            engine: builder.build(),
            store,
            remote,
            clock,
            events,
            config,
            crypto,
        }
    }
}

impl std::ops::Deref for TestEngine {
    type Target = SyncEngine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}
