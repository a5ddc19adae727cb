//! Crypto providers for cache tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use synq_engine::{CryptoError, CryptoProvider, CryptoResult};

/// A provider whose every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingCrypto;

#[async_trait]
impl CryptoProvider for FailingCrypto {
    async fn encrypt(&self, _plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        Err(CryptoError::EncryptionFailed("injected failure".into()))
    }

    async fn decrypt(&self, _ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        Err(CryptoError::DecryptionFailed("injected failure".into()))
    }
}

/// A reversible byte-flipping provider that can be switched off.
///
/// Not encryption; it only proves data passed through the provider.
#[derive(Debug)]
pub struct ToggleCrypto {
    enabled: AtomicBool,
}

impl ToggleCrypto {
    /// Creates an enabled provider.
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
        }
    }

    /// Enables or disables the provider.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn flip(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        if !self.enabled.load(Ordering::SeqCst) {
            return Err(CryptoError::Unavailable);
        }
        Ok(data.iter().map(|b| b ^ 0xA5).collect())
    }
}

impl Default for ToggleCrypto {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CryptoProvider for ToggleCrypto {
    async fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        self.flip(plaintext)
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        self.flip(ciphertext)
    }
}
