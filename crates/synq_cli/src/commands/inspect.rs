//! Inspect command implementation.

use super::{format_timestamp, open_store, OutputFormat};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use synq_engine::persist::{CACHE_PREFIX, DEAD_LETTER_KEY, LAST_SYNC_KEY, QUEUE_KEY};
use synq_engine::{CacheEntry, DeadLetterItem, Priority, SyncQueueItem, Timestamp};
use synq_storage::KeyValueStore;

/// State document summary.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResult {
    /// Document path.
    pub path: String,
    /// Document size in bytes.
    pub file_size: u64,
    /// Pending queue items.
    pub pending: usize,
    /// Pending items per priority class.
    pub pending_by_priority: BTreeMap<String, usize>,
    /// Enqueue time of the oldest pending item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_pending: Option<Timestamp>,
    /// Age of the oldest pending item in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_age_ms: Option<u64>,
    /// Archived items.
    pub dead_letter: usize,
    /// Archived items per failure reason.
    pub failure_reasons: BTreeMap<String, usize>,
    /// Cache entries.
    pub cache_entries: usize,
    /// Cache entries stored encrypted.
    pub encrypted_entries: usize,
    /// Completion time of the last drain pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<Timestamp>,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let result = collect(path)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text_output(&result),
    }

    Ok(())
}

/// Reads the document and tallies its contents against the wall clock.
pub fn collect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let now = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
    collect_at(path, now)
}

/// Reads the document and tallies its contents, measuring ages from `now`.
pub fn collect_at(path: &Path, now: Timestamp) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let store = open_store(path)?;

    let queue: Vec<SyncQueueItem> = match store.get(QUEUE_KEY)? {
        Some(value) => serde_json::from_value(value)?,
        None => Vec::new(),
    };
    let dead: Vec<DeadLetterItem> = match store.get(DEAD_LETTER_KEY)? {
        Some(value) => serde_json::from_value(value)?,
        None => Vec::new(),
    };
    let last_sync = store.get(LAST_SYNC_KEY)?.and_then(|v| v.as_u64());

    let mut pending_by_priority = BTreeMap::new();
    for priority in [Priority::High, Priority::Normal, Priority::Low] {
        let count = queue.iter().filter(|i| i.priority == priority).count();
        pending_by_priority.insert(priority_name(priority).to_string(), count);
    }

    let mut failure_reasons = BTreeMap::new();
    for item in &dead {
        *failure_reasons.entry(item.failure_reason.clone()).or_insert(0) += 1;
    }

    let mut cache_entries = 0;
    let mut encrypted_entries = 0;
    for key in store.keys()? {
        if !key.starts_with(CACHE_PREFIX) {
            continue;
        }
        cache_entries += 1;
        let entry = store
            .get(&key)?
            .and_then(|v| serde_json::from_value::<CacheEntry>(v).ok());
        if entry.is_some_and(|e| e.encrypted) {
            encrypted_entries += 1;
        }
    }

    let oldest = queue.iter().min_by_key(|i| i.enqueued_at);

    Ok(InspectResult {
        path: path.display().to_string(),
        file_size: std::fs::metadata(path)?.len(),
        pending: queue.len(),
        pending_by_priority,
        oldest_pending: oldest.map(|i| i.enqueued_at),
        oldest_age_ms: oldest.map(|i| i.age(now)),
        dead_letter: dead.len(),
        failure_reasons,
        cache_entries,
        encrypted_entries,
        last_sync,
    })
}

fn priority_name(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "high",
        Priority::Normal => "normal",
        Priority::Low => "low",
    }
}

fn format_age(millis: u64) -> String {
    let secs = millis / 1000;
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86_400)
    }
}

fn print_text_output(result: &InspectResult) {
    println!("Synq State Inspection");
    println!("=====================");
    println!();
    println!("Path: {}", result.path);
    println!("Size: {} bytes", result.file_size);
    println!();
    println!("Queue:");
    println!("  Pending: {}", result.pending);
    for (priority, count) in &result.pending_by_priority {
        println!("    {:<7} {}", priority, count);
    }
    if let (Some(oldest), Some(age)) = (result.oldest_pending, result.oldest_age_ms) {
        println!(
            "  Oldest:  {} ({} ago)",
            format_timestamp(oldest),
            format_age(age)
        );
    }
    println!();
    println!("Dead letter:");
    println!("  Archived: {}", result.dead_letter);
    for (reason, count) in &result.failure_reasons {
        println!("    {} x {}", count, reason);
    }
    println!();
    println!("Cache:");
    println!("  Entries:   {}", result.cache_entries);
    println!("  Encrypted: {}", result.encrypted_entries);
    println!();
    match result.last_sync {
        Some(ts) => println!("Last sync: {}", format_timestamp(ts)),
        None => println!("Last sync: never"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{dead, item, write_state};
    use serde_json::json;

    #[test]
    fn tallies_every_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_state(
            dir.path(),
            &[
                (
                    QUEUE_KEY,
                    json!([item("a", "high", 300), item("b", "low", 100), item("c", "low", 200)]),
                ),
                (
                    DEAD_LETTER_KEY,
                    json!([dead("x", "Queue overflow"), dead("y", "Queue overflow"), dead("z", "rejected: schema")]),
                ),
                (
                    "cache:roster",
                    json!({"key": "roster", "data": "AAAA", "timestamp": 1, "encrypted": true}),
                ),
                (
                    "cache:plain",
                    json!({"key": "plain", "data": [1], "timestamp": 1, "encrypted": false}),
                ),
                (LAST_SYNC_KEY, json!(5_000)),
            ],
        );

        let result = collect_at(&path, 60_100).unwrap();
        assert_eq!(result.pending, 3);
        assert_eq!(result.pending_by_priority["high"], 1);
        assert_eq!(result.pending_by_priority["normal"], 0);
        assert_eq!(result.pending_by_priority["low"], 2);
        assert_eq!(result.oldest_pending, Some(100));
        assert_eq!(result.oldest_age_ms, Some(60_000));
        assert_eq!(result.dead_letter, 3);
        assert_eq!(result.failure_reasons["Queue overflow"], 2);
        assert_eq!(result.cache_entries, 2);
        assert_eq!(result.encrypted_entries, 1);
        assert_eq!(result.last_sync, Some(5_000));
        assert!(result.file_size > 0);
    }

    #[test]
    fn empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_state(dir.path(), &[]);

        let result = collect(&path).unwrap();
        assert_eq!(result.pending, 0);
        assert_eq!(result.oldest_pending, None);
        assert_eq!(result.oldest_age_ms, None);
        assert_eq!(result.last_sync, None);
    }

    #[test]
    fn ages_render_in_largest_unit() {
        assert_eq!(format_age(59_999), "59s");
        assert_eq!(format_age(120_000), "2m");
        assert_eq!(format_age(7_200_000), "2h");
        assert_eq!(format_age(3 * 86_400_000), "3d");
    }

    #[test]
    fn malformed_queue_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_state(dir.path(), &[(QUEUE_KEY, json!("oops"))]);
        assert!(collect(&path).is_err());
    }
}
