//! Remote data store abstraction.
//!
//! The engine never speaks a wire protocol itself. It drives a
//! [`RemoteDataStore`] that applies one mutation at a time and, for updates,
//! reports the row currently stored so version conflicts can be detected.

use crate::model::Payload;
use crate::Version;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for remote store calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors reported by a remote store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The targeted row does not exist remotely.
    #[error("row {key} not found in {collection}")]
    NotFound {
        /// Collection searched.
        collection: String,
        /// Identifying key of the row.
        key: String,
    },

    /// The store refused the mutation (constraint, permission, schema).
    #[error("rejected: {0}")]
    Rejected(String),

    /// The store could not be reached or timed out.
    #[error("transport error: {0}")]
    Transport(String),
}

impl RemoteError {
    /// Creates a not-found error.
    pub fn not_found(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            key: key.into(),
        }
    }

    /// Creates a rejection error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// The current state of a remote row, as seen by an update's version check.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRow {
    /// Stored version, if the collection is versioned
    pub version: Option<Version>,
    /// Server-side last update timestamp
    pub updated_at: Option<String>,
    /// Remaining column values
    #[serde(default)]
    pub data: Payload,
}

impl RemoteRow {
    /// Creates a row at the given version.
    pub fn at_version(version: Version) -> Self {
        Self {
            version: Some(version),
            ..Self::default()
        }
    }

    /// Attaches column data.
    pub fn with_data(mut self, data: Payload) -> Self {
        self.data = data;
        self
    }
}

/// A remote relational store that applies single mutations.
///
/// Implementations own timeouts, authentication and schema validation. All
/// calls may suspend; the engine awaits them one at a time.
#[async_trait]
pub trait RemoteDataStore: Send + Sync {
    /// Inserts a new row into `collection`.
    async fn apply_insert(&self, collection: &str, data: &Payload) -> RemoteResult<()>;

    /// Deletes the row identified by `key`.
    async fn apply_delete(&self, collection: &str, key: &str) -> RemoteResult<()>;

    /// Reads the current version and update timestamp of a row.
    ///
    /// Returns `Ok(None)` when the row doesn't exist.
    async fn read_current(&self, collection: &str, key: &str) -> RemoteResult<Option<RemoteRow>>;

    /// Writes `data` to the row identified by `key`.
    async fn apply_update(&self, collection: &str, key: &str, data: &Payload) -> RemoteResult<()>;
}
