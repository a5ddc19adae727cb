//! End-to-end properties of the sync engine over in-memory collaborators.

use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use synq_engine::{
    Clock, EngineConfig, Operation, Priority, RemoteError, SyncEvent, Topic, OVERFLOW_REASON,
};
use synq_testkit::prelude::*;

#[tokio::test]
async fn drains_high_then_normal_then_low() {
    let t = TestEngine::online();
    t.queue_insert("low", Priority::Low);
    t.clock.advance(1);
    t.queue_insert("normal", Priority::Normal);
    t.clock.advance(1);
    t.queue_insert("high", Priority::High);

    let report = t.force_sync().await.unwrap().unwrap();
    assert_eq!(report.processed, 3);

    let order: Vec<String> = t
        .remote
        .applied()
        .into_iter()
        .map(|op| match op {
            AppliedOp::Insert { data, .. } => data["id"].as_str().unwrap().to_string(),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(order, vec!["high", "normal", "low"]);
}

#[tokio::test]
async fn fifo_within_priority() {
    let t = TestEngine::online();
    for id in ["a", "b", "c"] {
        t.queue_insert(id, Priority::Normal);
        t.clock.advance(5);
    }
    t.force_sync().await.unwrap();

    let ids: Vec<_> = t
        .remote
        .applied()
        .into_iter()
        .filter_map(|op| match op {
            AppliedOp::Insert { data, .. } => data["id"].as_str().map(str::to_string),
            _ => None,
        })
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[test]
fn overflow_dead_letters_the_oldest_item() {
    let t = TestEngine::offline();
    let first = t.queue_insert("m0", Priority::Normal);
    for i in 1..=1000 {
        t.clock.advance(1);
        t.queue_insert(&format!("m{i}"), Priority::Normal);
    }

    assert_eq!(t.sync_state().pending_changes, 1000);
    let dead = t.dead_letter_queue();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id(), first);
    assert_eq!(dead[0].failure_reason, OVERFLOW_REASON);
    assert!(!t.pending_items().iter().any(|i| i.id == first));
}

#[tokio::test]
async fn retry_ceiling_is_three() {
    let t = TestEngine::online();
    let id = t.queue_insert("m1", Priority::Normal);
    t.remote
        .fail_always(Some(RemoteError::transport("connection refused")));

    for expected_retries in 1..=2 {
        let report = t.force_sync().await.unwrap().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(t.pending_items()[0].retry_count, expected_retries);
        assert!(t.dead_letter_queue().is_empty());
    }

    let report = t.force_sync().await.unwrap().unwrap();
    assert_eq!(report.failed, 0);
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(t.sync_state().pending_changes, 0);

    let dead = t.dead_letter_queue();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id(), id);
    assert_eq!(dead[0].item.retry_count, 3);
    assert!(dead[0].failure_reason.contains("connection refused"));

    let failed = t.events.of(Topic::SyncFailed);
    assert_eq!(failed.len(), 1);
}

#[tokio::test]
async fn stale_update_server_wins() {
    let t = TestEngine::online();
    t.remote
        .put_row("members", "m1", 2, payload(json!({"name": "remote"})));

    t.queue_change(
        "members",
        Operation::Update,
        payload(json!({"id": "m1", "name": "local", "version": 1})),
        Priority::Normal,
    )
    .unwrap();

    let report = t.force_sync().await.unwrap().unwrap();
    assert_eq!(report.conflicts_resolved, 1);
    assert_eq!(t.sync_state().conflicts_resolved, 1);
    assert_eq!(t.sync_state().pending_changes, 0);
    assert!(t.remote.applied().is_empty());
    assert_eq!(t.remote.read_count(), 1);
    assert_eq!(t.remote.row("members", "m1").unwrap().data["name"], json!("remote"));

    let conflicts = t.events.of(Topic::SyncConflict);
    assert_eq!(conflicts.len(), 1);
    match &conflicts[0] {
        SyncEvent::SyncConflict {
            collection,
            local_version,
            remote_version,
            ..
        } => {
            assert_eq!(collection, "members");
            assert_eq!((*local_version, *remote_version), (1, 2));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn current_update_applies_with_bumped_version() {
    let t = TestEngine::online();
    t.remote.put_row("members", "m1", 3, payload(json!({})));
    t.queue_change(
        "members",
        Operation::Update,
        payload(json!({"id": "m1", "name": "local", "version": 3})),
        Priority::Normal,
    )
    .unwrap();

    t.force_sync().await.unwrap();
    let row = t.remote.row("members", "m1").unwrap();
    assert_eq!(row.version, Some(4));
    assert_eq!(row.updated_at.as_deref(), Some("2024-02-01T00:00:00.000Z"));
    assert_eq!(t.sync_state().conflicts_resolved, 0);
}

#[tokio::test]
async fn cache_survives_failing_crypto() {
    let t = TestEngine::with_crypto(Arc::new(FailingCrypto));
    let value = json!({"members": ["Ana", "Bea"], "count": 2});

    t.cache_data("roster", &value).await.unwrap();

    let entry = t.cache_entry("roster").unwrap();
    assert!(!entry.encrypted);
    let cached = t.cached_data::<serde_json::Value>("roster").await.unwrap();
    assert_eq!(cached.data, value);
    assert_eq!(cached.timestamp, START_MILLIS);
}

#[tokio::test]
async fn cache_encrypts_when_provider_works() {
    let crypto = Arc::new(ToggleCrypto::new());
    let t = TestEngine::with_crypto(crypto.clone());

    t.cache_data("roster", &vec!["Ana"]).await.unwrap();
    assert!(t.cache_entry("roster").unwrap().encrypted);
    assert_eq!(
        t.cached_data::<Vec<String>>("roster").await.unwrap().data,
        vec!["Ana"]
    );

    // A key that later goes missing leaves encrypted entries unreadable.
    crypto.set_enabled(false);
    assert!(t.cached_data::<Vec<String>>("roster").await.is_none());

    assert_eq!(t.clear_cache().unwrap(), 1);
    assert!(t.cache_entry("roster").is_none());
}

#[tokio::test]
async fn going_offline_cancels_remaining_items() {
    let t = TestEngine::online();
    let ids: Vec<String> = (1..=5)
        .map(|i| {
            t.clock.advance(1);
            t.queue_insert(&format!("m{i}"), Priority::Normal)
        })
        .collect();

    let engine = t.engine.clone();
    let remote = Arc::clone(&t.remote);
    t.remote.on_apply(move |_| {
        if remote.applied().len() == 2 {
            engine.set_online(false);
        }
    });

    let report = t.process_queue().await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.processed, 2);
    assert_eq!(report.remaining, 3);

    let state = t.sync_state();
    assert!(!state.sync_in_progress);
    assert_eq!(state.pending_changes, 3);
    let pending: Vec<String> = t.pending_items().into_iter().map(|i| i.id).collect();
    assert_eq!(pending, ids[2..].to_vec());
    assert!(t.pending_items().iter().all(|i| i.retry_count == 0));
}

#[tokio::test]
async fn dead_letter_retry_requeues_with_reset_counter() {
    let t = TestEngine::online();
    let x = t.queue_insert("x", Priority::Normal);
    let y = t.queue_insert("y", Priority::Normal);
    t.remote.fail_always(Some(RemoteError::rejected("constraint")));
    for _ in 0..3 {
        t.force_sync().await.unwrap();
    }
    assert_eq!(t.dead_letter_queue().len(), 2);

    assert_eq!(t.retry_dead_letter(Some(&[x.clone()])).unwrap(), 1);

    let pending = t.pending_items();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, x);
    assert_eq!(pending[0].retry_count, 0);
    let dead: Vec<String> = t.dead_letter_queue().iter().map(|d| d.id().to_string()).collect();
    assert_eq!(dead, vec![y]);

    t.remote.fail_always(None);
    let report = t.force_sync().await.unwrap().unwrap();
    assert_eq!(report.processed, 1);
}

#[tokio::test]
async fn pass_events_carry_counts() {
    let t = TestEngine::online();
    t.queue_insert("a", Priority::Normal);
    t.queue_insert("b", Priority::Normal);
    t.remote.fail_next(RemoteError::transport("timeout"));
    t.events.clear();

    t.force_sync().await.unwrap();

    assert_eq!(
        t.events.of(Topic::SyncStarted),
        vec![SyncEvent::SyncStarted { pending: 2 }]
    );
    assert_eq!(
        t.events.of(Topic::SyncCompleted),
        vec![SyncEvent::SyncCompleted {
            processed: 1,
            failed: 1,
            remaining: 1,
            conflicts_resolved: 0,
            cancelled: false,
        }]
    );
    assert_eq!(t.sync_state().last_sync_timestamp, Some(START_MILLIS));
}

#[tokio::test]
async fn overlapping_passes_are_single_flight() {
    let t = TestEngine::online();
    t.queue_insert("a", Priority::Normal);
    t.queue_insert("b", Priority::Normal);

    let engine = t.engine.clone();
    let observed = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    t.remote
        .on_apply(move |_| sink.lock().push(engine.sync_state().sync_in_progress));

    let (first, second) = tokio::join!(t.process_queue(), t.process_queue());
    assert_eq!([first.is_some(), second.is_some()].iter().filter(|r| **r).count(), 1);
    assert_eq!(t.remote.applied().len(), 2);
    assert_eq!(*observed.lock(), vec![true, true]);
    assert!(!t.sync_state().sync_in_progress);
}

#[test]
fn disposed_engine_rejects_changes() {
    let t = TestEngine::offline();
    t.dispose();
    assert!(t
        .queue_change("members", Operation::Insert, payload(json!({})), Priority::Normal)
        .is_err());
}

#[test]
fn expired_items_are_purged_on_restart() {
    let t = TestEngine::with_config(EngineConfig::new().with_initial_online(false));
    t.queue_insert("old", Priority::Normal);
    t.clock.advance(2 * DAY_MILLIS);
    t.queue_insert("recent", Priority::Normal);

    t.clock.advance(6 * DAY_MILLIS);
    let t = t.restart();

    let pending: Vec<_> = t.pending_items();
    assert_eq!(pending.len(), 1);
    assert!(t.dead_letter_queue().is_empty());
    assert_eq!(t.stored("sync-queue").unwrap().as_array().unwrap().len(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn restart_preserves_unexpired_queue(
        gaps in prop::collection::vec(0u64..(3 * DAY_MILLIS), 0..30),
        idle in 0u64..(10 * DAY_MILLIS),
        cap in 5usize..40,
    ) {
        let t = TestEngine::with_config(
            EngineConfig::new().with_initial_online(false).with_max_queue_size(cap),
        );
        for (i, gap) in gaps.iter().enumerate() {
            t.clock.advance(*gap);
            t.queue_insert(&format!("m{i}"), Priority::Normal);
        }
        let queued: Vec<u64> = t.pending_items().iter().map(|i| i.enqueued_at).collect();
        prop_assert_eq!(queued.len(), gaps.len().min(cap));

        t.clock.advance(idle);
        let cutoff = t.clock.now_millis().saturating_sub(7 * DAY_MILLIS);
        let expected = queued.iter().filter(|at| **at > cutoff).count();

        let t = t.restart();
        prop_assert_eq!(t.sync_state().pending_changes, expected);
    }
}
