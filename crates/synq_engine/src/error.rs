//! Error types for the sync engine.

use crate::crypto::CryptoError;
use crate::remote::RemoteError;
use synq_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Per-item failures inside a drain pass never surface here; they become
/// retry-count increments or dead-letter moves. These errors are reserved for
/// calls the caller made explicitly.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A sync was forced while the client is offline.
    #[error("cannot sync while offline")]
    Offline,

    /// The engine has been disposed.
    #[error("sync engine has been disposed")]
    Disposed,

    /// The mutation payload is unusable for its operation.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Durable store error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Encryption or decryption failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The remote store rejected or failed an operation.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}

impl SyncError {
    /// Creates an invalid-payload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }

    /// Returns true if retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Offline => true,
            SyncError::Storage(StorageError::Io(_)) => true,
            SyncError::Remote(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::Offline.is_retryable());
        assert!(SyncError::Remote(RemoteError::transport("connection reset")).is_retryable());
        assert!(!SyncError::Disposed.is_retryable());
        assert!(!SyncError::invalid_payload("missing id").is_retryable());
        assert!(!SyncError::Storage(StorageError::Corrupted("not an object".into())).is_retryable());
    }

    #[test]
    fn error_display() {
        assert_eq!(SyncError::Offline.to_string(), "cannot sync while offline");

        let err = SyncError::invalid_payload("update requires field 'id'");
        assert_eq!(err.to_string(), "invalid payload: update requires field 'id'");

        let err = SyncError::from(RemoteError::not_found("members", "m1"));
        assert!(err.to_string().contains("members"));
        assert!(err.to_string().contains("m1"));
    }
}
