//! Dead-letter listing and retry.

use super::{format_timestamp, open_engine, open_store, short_id, OutputFormat};
use std::path::Path;
use synq_engine::persist::DEAD_LETTER_KEY;
use synq_engine::DeadLetterItem;
use synq_storage::KeyValueStore;

/// Lists archived items, newest failure first.
pub fn list(path: &Path, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let items = archived(path)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
        OutputFormat::Text => {
            if items.is_empty() {
                println!("Dead-letter queue is empty");
                return Ok(());
            }
            for dead in &items {
                println!(
                    "{}  {} {}  failed {}  ({} retries)",
                    short_id(dead.id()),
                    dead.item.operation,
                    dead.item.collection,
                    format_timestamp(dead.failed_at),
                    dead.item.retry_count
                );
                println!("    {}", dead.failure_reason);
            }
            println!();
            println!("{} archived", items.len());
        }
    }

    Ok(())
}

/// Stored dead-letter items sorted by failure time, newest first.
pub fn archived(path: &Path) -> Result<Vec<DeadLetterItem>, Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let mut items: Vec<DeadLetterItem> = match store.get(DEAD_LETTER_KEY)? {
        Some(value) => serde_json::from_value(value)?,
        None => Vec::new(),
    };
    items.sort_by(|a, b| b.failed_at.cmp(&a.failed_at));
    Ok(items)
}

/// Moves archived items back into the queue with fresh retry counters.
///
/// An empty `ids` re-queues everything.
pub fn retry(path: &Path, ids: &[String]) -> Result<usize, Box<dyn std::error::Error>> {
    let engine = open_engine(path)?;
    let selection = (!ids.is_empty()).then_some(ids);
    let moved = engine.retry_dead_letter(selection)?;
    engine.dispose();

    println!("Re-queued {} item(s)", moved);
    if let Some(ids) = selection {
        if moved < ids.len() {
            println!("{} id(s) were not in the dead-letter queue", ids.len() - moved);
        }
    }
    Ok(moved)
}
