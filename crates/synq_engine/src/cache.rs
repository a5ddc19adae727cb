//! Encrypted local cache with plaintext fallback.
//!
//! Values are JSON-encoded and, when a [`CryptoProvider`] is configured and
//! working, stored as base64 ciphertext. If encryption is unavailable or
//! fails, the value is stored in plain form and the entry records
//! `encrypted: false`; the cache never fails a write because of the cipher.

use crate::clock::Clock;
use crate::crypto::CryptoProvider;
use crate::error::SyncResult;
use crate::persist::{self, cache_key, CACHE_PREFIX};
use crate::Timestamp;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use synq_storage::KeyValueStore;

/// A cache entry as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Caller-supplied key, without the store prefix
    pub key: String,
    /// Plain JSON value, or a base64 ciphertext string when `encrypted`
    pub data: Value,
    /// Write time (milliseconds since epoch)
    pub timestamp: Timestamp,
    /// Which form `data` is in
    pub encrypted: bool,
}

/// A decoded cache value with its write time.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedData<T> {
    /// The cached value.
    pub data: T,
    /// Write time (milliseconds since epoch).
    pub timestamp: Timestamp,
}

/// Key-value cache over the durable store, encrypted when possible.
pub struct EncryptedCache {
    store: Arc<dyn KeyValueStore>,
    crypto: Option<Arc<dyn CryptoProvider>>,
    clock: Arc<dyn Clock>,
}

impl EncryptedCache {
    /// Creates a cache. Without a provider every entry is stored in plain form.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        crypto: Option<Arc<dyn CryptoProvider>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            crypto,
            clock,
        }
    }

    /// Stores `value` under `key`.
    ///
    /// Fails only if `value` cannot be JSON-encoded. Cipher and store
    /// failures are logged.
    pub async fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> SyncResult<()> {
        let plain = serde_json::to_value(value)?;
        let (data, encrypted) = match self.seal(key, &plain).await {
            Some(ciphertext) => (Value::String(ciphertext), true),
            None => (plain, false),
        };

        let entry = CacheEntry {
            key: key.to_string(),
            data,
            timestamp: self.clock.now_millis(),
            encrypted,
        };
        if let Err(e) = persist::write(self.store.as_ref(), &cache_key(key), &entry) {
            tracing::error!(key, error = %e, "failed to write cache entry");
        }
        Ok(())
    }

    /// Reads and decodes the value under `key`.
    ///
    /// Missing entries, undecryptable ciphertext and values that do not
    /// decode as `T` all yield `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<CachedData<T>> {
        let entry = self.entry(key)?;
        let timestamp = entry.timestamp;

        let plain = if entry.encrypted {
            self.open(key, &entry.data).await?
        } else {
            entry.data
        };

        match serde_json::from_value(plain) {
            Ok(data) => Some(CachedData { data, timestamp }),
            Err(e) => {
                tracing::warn!(key, error = %e, "cache entry does not match requested type");
                None
            }
        }
    }

    /// Returns the raw persisted entry under `key`.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        match persist::read(self.store.as_ref(), &cache_key(key)) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key, error = %e, "unreadable cache entry");
                None
            }
        }
    }

    /// Returns every readable cache entry.
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.cache_keys()
            .iter()
            .filter_map(|k| k.strip_prefix(CACHE_PREFIX))
            .filter_map(|k| self.entry(k))
            .collect()
    }

    /// Removes every cache entry, leaving queue and archive state alone.
    ///
    /// Returns the number of entries removed.
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        for key in self.cache_keys() {
            match self.store.delete(&key) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(key = %key, error = %e, "failed to delete cache entry"),
            }
        }
        if let Err(e) = self.store.save() {
            tracing::error!(error = %e, "failed to flush after cache clear");
        }
        tracing::info!(removed, "cache cleared");
        removed
    }

    fn cache_keys(&self) -> Vec<String> {
        match self.store.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter(|k| k.starts_with(CACHE_PREFIX))
                .collect(),
            Err(e) => {
                tracing::error!(error = %e, "failed to list store keys");
                Vec::new()
            }
        }
    }

    async fn seal(&self, key: &str, plain: &Value) -> Option<String> {
        let crypto = self.crypto.as_ref()?;
        let bytes = match serde_json::to_vec(plain) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache value not encodable, storing unencrypted");
                return None;
            }
        };

        match crypto.encrypt(&bytes).await {
            Ok(ciphertext) => Some(BASE64.encode(ciphertext)),
            Err(e) => {
                tracing::warn!(key, error = %e, "encryption unavailable, storing unencrypted");
                None
            }
        }
    }

    async fn open(&self, key: &str, data: &Value) -> Option<Value> {
        let Some(crypto) = self.crypto.as_ref() else {
            tracing::warn!(key, "encrypted cache entry but no crypto provider configured");
            return None;
        };
        let Some(encoded) = data.as_str() else {
            tracing::warn!(key, "encrypted cache entry is not a string");
            return None;
        };

        let ciphertext = BASE64
            .decode(encoded)
            .map_err(|e| tracing::warn!(key, error = %e, "cache ciphertext is not base64"))
            .ok()?;
        let plain = crypto
            .decrypt(&ciphertext)
            .await
            .map_err(|e| tracing::warn!(key, error = %e, "cache entry failed to decrypt"))
            .ok()?;
        serde_json::from_slice(&plain)
            .map_err(|e| tracing::warn!(key, error = %e, "decrypted cache entry is not JSON"))
            .ok()
    }
}

impl std::fmt::Debug for EncryptedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedCache")
            .field("encrypting", &self.crypto.is_some())
            .finish()
    }
}
