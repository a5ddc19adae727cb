//! Cache maintenance.

use super::open_engine;
use std::path::Path;

/// Removes every cache entry and reports how many were dropped.
pub fn clear(path: &Path) -> Result<usize, Box<dyn std::error::Error>> {
    let engine = open_engine(path)?;
    let removed = engine.clear_cache()?;
    engine.dispose();

    println!("Removed {} cache entr{}", removed, if removed == 1 { "y" } else { "ies" });
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{item, write_state};
    use serde_json::json;
    use synq_engine::persist::QUEUE_KEY;
    use synq_storage::{FileStore, KeyValueStore};

    #[test]
    fn clears_only_cache_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_state(
            dir.path(),
            &[
                (QUEUE_KEY, json!([item("a", "normal", u64::MAX / 2)])),
                ("cache:roster", json!({"key": "roster", "data": [], "timestamp": 1, "encrypted": false})),
                ("cache:teams", json!({"key": "teams", "data": [], "timestamp": 1, "encrypted": false})),
            ],
        );

        assert_eq!(clear(&path).unwrap(), 2);

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.keys().unwrap(), [QUEUE_KEY]);
    }
}
