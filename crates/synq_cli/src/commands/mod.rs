//! CLI command implementations.

pub mod cache;
pub mod dead_letter;
pub mod inspect;
pub mod queue;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use synq_engine::{
    EngineConfig, Payload, RemoteDataStore, RemoteError, RemoteResult, RemoteRow, SyncEngine,
    Timestamp,
};
use synq_storage::{FileStore, StorageError};
use thiserror::Error;

/// Errors raised by the CLI before the engine gets involved.
#[derive(Error, Debug)]
pub enum CliError {
    /// No state document exists at the given path.
    #[error("no sync state found at {0}")]
    NoState(PathBuf),

    /// The `--format` value isn't recognized.
    #[error("unknown output format '{0}' (expected text or json)")]
    UnknownFormat(String),

    /// The state document couldn't be opened.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Output rendering selected with `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable tables.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl FromStr for OutputFormat {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(CliError::UnknownFormat(other.to_string())),
        }
    }
}

/// Opens an existing state document read-only.
pub fn open_store(path: &Path) -> Result<FileStore, CliError> {
    if !path.exists() {
        return Err(CliError::NoState(path.to_path_buf()));
    }
    tracing::debug!(path = %path.display(), "opening sync state");
    Ok(FileStore::open(path)?)
}

/// Builds an engine over the document that never contacts a server.
///
/// The engine starts offline with auto-sync disabled, so mutating commands
/// only rewrite local state.
pub fn open_engine(path: &Path) -> Result<SyncEngine, CliError> {
    let store = Arc::new(open_store(path)?);
    let config = EngineConfig::new()
        .with_initial_online(false)
        .with_auto_sync(false);
    Ok(SyncEngine::builder(store, Arc::new(Unreachable)).config(config).build())
}

/// Remote store used by maintenance commands.
struct Unreachable;

#[async_trait]
impl RemoteDataStore for Unreachable {
    async fn apply_insert(&self, _collection: &str, _data: &Payload) -> RemoteResult<()> {
        Err(offline())
    }

    async fn apply_delete(&self, _collection: &str, _key: &str) -> RemoteResult<()> {
        Err(offline())
    }

    async fn read_current(&self, _collection: &str, _key: &str) -> RemoteResult<Option<RemoteRow>> {
        Err(offline())
    }

    async fn apply_update(&self, _collection: &str, _key: &str, _data: &Payload) -> RemoteResult<()> {
        Err(offline())
    }
}

fn offline() -> RemoteError {
    RemoteError::transport("maintenance commands never contact the server")
}

/// Renders milliseconds since the epoch as RFC 3339.
pub fn format_timestamp(millis: Timestamp) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_else(|| millis.to_string())
}

/// Shortens a UUID for table output.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_formats() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!(matches!(
            "yaml".parse::<OutputFormat>(),
            Err(CliError::UnknownFormat(_))
        ));
    }

    #[test]
    fn missing_state_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_store(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, CliError::NoState(_)));
    }

    #[test]
    fn timestamps_render_as_utc() {
        assert_eq!(format_timestamp(1_706_745_600_000), "2024-02-01T00:00:00Z");
    }

    #[test]
    fn short_ids() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }
}
