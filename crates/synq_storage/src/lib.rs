//! # Synq Storage
//!
//! Durable key-value store trait and implementations for Synq.
//!
//! This crate provides the persistence seam for the sync engine. Stores
//! are **opaque JSON value stores** keyed by string - they do not interpret
//! the queue, dead-letter or cache documents they hold.
//!
//! ## Design Principles
//!
//! - Stores are simple keyed maps (get, set, delete, keys, save)
//! - Mutations become durable only after [`KeyValueStore::save`] returns
//! - Must be `Send + Sync` so one store can back every engine component
//! - The engine owns all document layout decisions
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral clients
//! - [`FileStore`] - A single JSON document on disk, rewritten atomically
//!
//! ## Example
//!
//! ```rust
//! use synq_storage::{InMemoryStore, KeyValueStore};
//! use serde_json::json;
//!
//! let store = InMemoryStore::new();
//! store.set("last-sync-timestamp", json!(1706745600000u64)).unwrap();
//! store.save().unwrap();
//! assert_eq!(store.get("last-sync-timestamp").unwrap(), Some(json!(1706745600000u64)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::KeyValueStore;
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
