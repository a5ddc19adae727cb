//! # Synq Engine
//!
//! Offline-first synchronization engine for Synq clients.
//!
//! This crate provides:
//! - A durable, bounded, priority-ordered queue of pending mutations
//! - A single-flight drain processor with cancellation on disconnect
//! - Optimistic-concurrency conflict detection and resolution
//! - A bounded dead-letter archive with operator retry
//! - An encrypted local cache that degrades to plaintext
//! - An in-process event bus and connectivity monitor
//! - A platform driver with exponential backoff between passes
//!
//! ## Architecture
//!
//! Callers queue mutations while working against local data. Whenever the
//! client is online the processor drains the queue in priority order,
//! applying one mutation at a time through a [`RemoteDataStore`]:
//! 1. Successful items leave the queue
//! 2. Stale updates go to the [`ConflictResolver`] (server-wins by default)
//! 3. Failed items stay queued with a bumped retry counter
//! 4. Items reaching the retry ceiling move to the dead-letter archive
//!
//! ## Key Invariants
//!
//! - At most one drain pass runs at a time
//! - An item id lives in the queue or the archive, never both
//! - Every queue mutation is persisted before the call returns
//! - A single bad item never aborts a pass
//! - Capacity overflow never fails an enqueue

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod clock;
mod config;
mod connectivity;
mod dead_letter;
mod driver;
mod engine;
mod error;
mod events;
mod model;
mod processor;
mod queue;
mod remote;

pub mod conflict;
pub mod crypto;
pub mod persist;

/// Queue item identifier (UUID v4 text).
pub type ItemId = String;

/// Name of a remote collection.
pub type CollectionName = String;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Optimistic-concurrency version number.
pub type Version = u64;

/// Crate version, as published.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use cache::{CacheEntry, CachedData, EncryptedCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, RetryConfig, DEFAULT_QUEUE_EXPIRY};
pub use conflict::{
    Conflict, ConflictResolver, ConflictStrategy, MergeResolver, PolicyResolver, Resolution,
};
pub use connectivity::ConnectivityMonitor;
pub use crypto::{AesGcmProvider, CryptoError, CryptoProvider, CryptoResult, EncryptionKey};
pub use dead_letter::DeadLetterStore;
pub use driver::PlatformEvent;
pub use engine::{EngineBuilder, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use events::{EventBus, SubscriptionId, SyncEvent, Topic};
pub use model::{
    base_version_of, DeadLetterItem, Operation, Payload, Priority, SyncQueueItem, SyncState,
    DEFAULT_KEY_FIELD, DEFAULT_VERSION_FIELD,
};
pub use processor::{CancelToken, SyncProcessor, SyncReport, SyncStats, UPDATED_AT_FIELD};
pub use queue::{PassOutcome, SyncQueueStore, OVERFLOW_REASON};
pub use remote::{RemoteDataStore, RemoteError, RemoteResult, RemoteRow};
