//! Optimistic-concurrency conflict resolution.
//!
//! A conflict arises when an update's base version is older than the version
//! currently stored remotely. The processor hands the conflict to a
//! [`ConflictResolver`] and acts on the returned [`Resolution`]:
//!
//! - [`Resolution::ServerWins`]: the local change is discarded; the item
//!   leaves the queue without being applied.
//! - [`Resolution::ClientWins`]: the local payload is written over the
//!   remote row with a bumped version.
//! - [`Resolution::Manual`]: the supplied merged payload is written instead.
//!
//! The default resolver is server-wins, so a stale client never silently
//! overwrites newer remote state.

use crate::model::{Payload, SyncQueueItem};
use crate::remote::RemoteRow;
use crate::Version;
use serde::{Deserialize, Serialize};

/// A stale update detected against the remote row.
#[derive(Debug, Clone, Copy)]
pub struct Conflict<'a> {
    /// The queued update.
    pub item: &'a SyncQueueItem,
    /// The row currently stored remotely.
    pub remote: &'a RemoteRow,
    /// Version the update was based on.
    pub local_version: Version,
    /// Version stored remotely.
    pub remote_version: Version,
}

/// Outcome chosen by a resolver.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Keep the remote row and drop the local change.
    ServerWins,
    /// Overwrite the remote row with the local payload.
    ClientWins,
    /// Overwrite the remote row with caller-merged data.
    Manual {
        /// Data to write.
        merged: Payload,
    },
}

impl Resolution {
    /// The strategy this resolution reports.
    pub fn strategy(&self) -> ConflictStrategy {
        match self {
            Resolution::ServerWins => ConflictStrategy::ServerWins,
            Resolution::ClientWins => ConflictStrategy::ClientWins,
            Resolution::Manual { .. } => ConflictStrategy::Manual,
        }
    }
}

/// Strategy label reported in conflict events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Remote state kept.
    ServerWins,
    /// Local state written.
    ClientWins,
    /// Merged state written.
    Manual,
}

impl std::fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConflictStrategy::ServerWins => "server-wins",
            ConflictStrategy::ClientWins => "client-wins",
            ConflictStrategy::Manual => "manual",
        })
    }
}

/// Decides how to reconcile a stale update.
pub trait ConflictResolver: Send + Sync {
    /// Chooses a resolution for `conflict`.
    fn resolve(&self, conflict: &Conflict<'_>) -> Resolution;
}

/// Applies a fixed policy to every conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyResolver {
    client_wins: bool,
}

impl PolicyResolver {
    /// Always keep the remote row.
    pub const fn server_wins() -> Self {
        Self { client_wins: false }
    }

    /// Always write the local payload.
    pub const fn client_wins() -> Self {
        Self { client_wins: true }
    }
}

impl Default for PolicyResolver {
    fn default() -> Self {
        Self::server_wins()
    }
}

impl ConflictResolver for PolicyResolver {
    fn resolve(&self, _conflict: &Conflict<'_>) -> Resolution {
        if self.client_wins {
            Resolution::ClientWins
        } else {
            Resolution::ServerWins
        }
    }
}

/// Resolves every conflict by merging local and remote data with a closure.
///
/// ```rust
/// use synq_engine::conflict::{Conflict, ConflictResolver, MergeResolver, Resolution};
///
/// // Remote columns win, local columns fill the gaps.
/// let resolver = MergeResolver::new(|conflict: &Conflict<'_>| {
///     let mut merged = conflict.item.payload.clone();
///     for (k, v) in &conflict.remote.data {
///         merged.insert(k.clone(), v.clone());
///     }
///     merged
/// });
/// # let _ = resolver;
/// ```
pub struct MergeResolver<F> {
    merge: F,
}

impl<F> MergeResolver<F>
where
    F: Fn(&Conflict<'_>) -> Payload + Send + Sync,
{
    /// Wraps a merge function.
    pub fn new(merge: F) -> Self {
        Self { merge }
    }
}

impl<F> ConflictResolver for MergeResolver<F>
where
    F: Fn(&Conflict<'_>) -> Payload + Send + Sync,
{
    fn resolve(&self, conflict: &Conflict<'_>) -> Resolution {
        Resolution::Manual {
            merged: (self.merge)(conflict),
        }
    }
}

impl<F> std::fmt::Debug for MergeResolver<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Operation, Priority};
    use serde_json::json;

    fn stale_update() -> (SyncQueueItem, RemoteRow) {
        let payload = json!({"id": "m1", "name": "local", "version": 1});
        let item = SyncQueueItem::new(
            "members",
            Operation::Update,
            payload.as_object().cloned().unwrap(),
            Priority::Normal,
            0,
        );
        let remote = RemoteRow::at_version(2)
            .with_data(json!({"name": "remote", "phone": "555"}).as_object().cloned().unwrap());
        (item, remote)
    }

    #[test]
    fn policy_defaults_to_server_wins() {
        let (item, remote) = stale_update();
        let conflict = Conflict {
            item: &item,
            remote: &remote,
            local_version: 1,
            remote_version: 2,
        };
        assert_eq!(PolicyResolver::default().resolve(&conflict), Resolution::ServerWins);
        assert_eq!(
            PolicyResolver::client_wins().resolve(&conflict),
            Resolution::ClientWins
        );
    }

    #[test]
    fn merge_resolver_yields_manual() {
        let (item, remote) = stale_update();
        let conflict = Conflict {
            item: &item,
            remote: &remote,
            local_version: 1,
            remote_version: 2,
        };
        let resolver = MergeResolver::new(|c: &Conflict<'_>| {
            let mut merged = c.remote.data.clone();
            merged.insert("name".into(), c.item.payload["name"].clone());
            merged
        });

        let resolution = resolver.resolve(&conflict);
        assert_eq!(resolution.strategy(), ConflictStrategy::Manual);
        let Resolution::Manual { merged } = resolution else {
            panic!("expected manual resolution");
        };
        assert_eq!(merged["name"], json!("local"));
        assert_eq!(merged["phone"], json!("555"));
    }

    #[test]
    fn strategy_labels() {
        assert_eq!(ConflictStrategy::ServerWins.to_string(), "server-wins");
        assert_eq!(
            serde_json::to_value(ConflictStrategy::ClientWins).unwrap(),
            json!("client-wins")
        );
    }
}
