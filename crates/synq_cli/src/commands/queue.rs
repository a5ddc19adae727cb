//! Queue listing.

use super::{format_timestamp, open_store, short_id, OutputFormat};
use std::path::Path;
use synq_engine::persist::QUEUE_KEY;
use synq_engine::SyncQueueItem;
use synq_storage::KeyValueStore;

/// Lists pending items in the order a drain pass would attempt them.
pub fn list(path: &Path, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let items = pending(path)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
        OutputFormat::Text => {
            if items.is_empty() {
                println!("Queue is empty");
                return Ok(());
            }
            println!(
                "{:<8}  {:<20}  {:<6}  {:<6}  {:>7}  {}",
                "ID", "COLLECTION", "OP", "PRIO", "RETRIES", "ENQUEUED"
            );
            for item in &items {
                println!(
                    "{:<8}  {:<20}  {:<6}  {:<6}  {:>7}  {}",
                    short_id(&item.id),
                    item.collection,
                    item.operation,
                    format!("{:?}", item.priority).to_lowercase(),
                    item.retry_count,
                    format_timestamp(item.enqueued_at)
                );
            }
            println!();
            println!("{} pending", items.len());
        }
    }

    Ok(())
}

/// Stored queue sorted by priority, then enqueue time.
pub fn pending(path: &Path) -> Result<Vec<SyncQueueItem>, Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let mut items: Vec<SyncQueueItem> = match store.get(QUEUE_KEY)? {
        Some(value) => serde_json::from_value(value)?,
        None => Vec::new(),
    };
    items.sort_by_key(|i| (i.priority, i.enqueued_at));
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{item, write_state};
    use serde_json::json;

    #[test]
    fn drain_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_state(
            dir.path(),
            &[(
                QUEUE_KEY,
                json!([
                    item("low", "low", 100),
                    item("late", "normal", 300),
                    item("early", "normal", 200),
                    item("urgent", "high", 400)
                ]),
            )],
        );

        let ids: Vec<_> = pending(&path).unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, ["urgent", "early", "late", "low"]);
    }

    #[test]
    fn missing_queue_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_state(dir.path(), &[]);
        assert!(pending(&path).unwrap().is_empty());
        list(&path, OutputFormat::Text).unwrap();
    }
}
