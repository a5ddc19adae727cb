//! Property-based test generators using proptest.

use proptest::prelude::*;
use serde_json::Value;
use synq_engine::{Operation, Payload, Priority, SyncQueueItem};

/// Strategy for priorities.
pub fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::High),
        Just(Priority::Normal),
        Just(Priority::Low),
    ]
}

/// Strategy for operations.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        Just(Operation::Insert),
        Just(Operation::Update),
        Just(Operation::Delete),
    ]
}

/// Strategy for collection names.
pub fn collection_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z_]{0,15}").expect("Invalid regex")
}

/// Strategy for payloads that always carry a string `id`.
pub fn payload_strategy() -> impl Strategy<Value = Payload> {
    (
        "[a-z0-9]{1,12}",
        prop::collection::btree_map("[a-z]{1,8}", any::<i32>(), 0..5),
        prop::option::of(1u64..10),
    )
        .prop_map(|(id, fields, version)| {
            let mut payload: Payload = fields
                .into_iter()
                .map(|(k, v)| (k, Value::from(v)))
                .collect();
            payload.insert("id".into(), Value::String(id));
            if let Some(version) = version {
                payload.insert("version".into(), Value::from(version));
            }
            payload
        })
}

/// Strategy for queue items enqueued within `0..max_age` milliseconds.
pub fn queue_item_strategy(max_age: u64) -> impl Strategy<Value = SyncQueueItem> {
    (
        collection_strategy(),
        operation_strategy(),
        payload_strategy(),
        priority_strategy(),
        0..max_age.max(1),
    )
        .prop_map(|(collection, operation, payload, priority, enqueued_at)| {
            SyncQueueItem::new(collection, operation, payload, priority, enqueued_at)
        })
}
