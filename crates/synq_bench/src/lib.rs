//! Shared helpers for the Synq benchmarks.

use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;
use synq_engine::{
    Clock, DeadLetterStore, EngineConfig, EventBus, ManualClock, Operation, Payload, Priority,
    SyncQueueItem, SyncQueueStore,
};
use synq_storage::{InMemoryStore, KeyValueStore};

/// Fixed start time for benchmark clocks.
pub const START_MILLIS: u64 = 1_706_745_600_000;

/// A payload with an id and roughly `size` bytes of text.
pub fn random_payload(size: usize) -> Payload {
    let mut rng = rand::thread_rng();
    let note: String = (0..size).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();
    let mut payload = Payload::new();
    payload.insert("id".into(), json!(uuid_like(&mut rng)));
    payload.insert("note".into(), Value::String(note));
    payload
}

fn uuid_like(rng: &mut impl Rng) -> String {
    format!("{:032x}", rng.gen::<u128>())
}

/// `count` insert items with random priorities and increasing enqueue times.
pub fn queue_items(count: usize, payload_size: usize) -> Vec<SyncQueueItem> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            let priority = match rng.gen_range(0..3) {
                0 => Priority::High,
                1 => Priority::Normal,
                _ => Priority::Low,
            };
            SyncQueueItem::new(
                "members",
                Operation::Insert,
                random_payload(payload_size),
                priority,
                START_MILLIS + i as u64,
            )
        })
        .collect()
}

/// A queue store over `store` with the given capacity.
pub fn queue_store(store: Arc<dyn KeyValueStore>, max_size: usize) -> SyncQueueStore {
    let events = Arc::new(EventBus::default());
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(START_MILLIS));
    let dead_letter = Arc::new(DeadLetterStore::new(
        store.clone(),
        events.clone(),
        clock.clone(),
        100,
    ));
    let config = EngineConfig::new().with_max_queue_size(max_size);
    SyncQueueStore::new(store, dead_letter, events, clock, &config)
}

/// A queue store over a fresh in-memory store.
pub fn memory_queue(max_size: usize) -> SyncQueueStore {
    queue_store(Arc::new(InMemoryStore::new()), max_size)
}
