//! Secure crypto provider for cached data.
//!
//! The cache encrypts through the [`CryptoProvider`] trait so that platform
//! keychains or hardware-backed keys can stand in for the built-in
//! [`AesGcmProvider`]. The built-in provider requires the `encryption`
//! feature; without it the provider is a stub whose calls fail with
//! [`CryptoError::Unavailable`], and the cache falls back to plaintext.
//!
//! ## Security Model
//!
//! - AES-256-GCM authenticated encryption
//! - Fresh random nonce per call, prepended to the ciphertext
//! - Keys are zeroized on drop
//! - Password derivation uses HKDF-SHA256
//!
//! ## Usage
//!
//! ```ignore
//! use synq_engine::crypto::{AesGcmProvider, CryptoProvider, EncryptionKey};
//!
//! let provider = AesGcmProvider::new(EncryptionKey::generate());
//! let ciphertext = provider.encrypt(b"roster").await?;
//! let plaintext = provider.decrypt(&ciphertext).await?;
//! ```

use async_trait::async_trait;
use thiserror::Error;

#[cfg(feature = "encryption")]
mod aes;

#[cfg(feature = "encryption")]
pub use aes::*;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised by a crypto provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// No working cipher is available.
    #[error("encryption is not available")]
    Unavailable,

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (wrong key, tampered or truncated data).
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Key material has the wrong length.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Bytes supplied.
        actual: usize,
        /// Bytes required.
        expected: usize,
    },

    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

/// Platform encryption used by the encrypted cache.
///
/// Either call may fail; callers treat a failure as "encryption unavailable"
/// rather than as fatal.
#[async_trait]
pub trait CryptoProvider: Send + Sync {
    /// Encrypts `plaintext`, returning opaque ciphertext.
    async fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Decrypts ciphertext produced by [`encrypt`](Self::encrypt).
    async fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>>;
}

/// Provider contents when the encryption feature is disabled.
#[cfg(not(feature = "encryption"))]
mod stub {
    use super::{CryptoError, CryptoProvider, CryptoResult};
    use async_trait::async_trait;

    /// Encryption key (stub when encryption disabled).
    #[derive(Debug, Clone)]
    pub struct EncryptionKey {
        _private: (),
    }

    impl EncryptionKey {
        /// Always returns an error when encryption is disabled.
        pub fn from_bytes(_bytes: &[u8]) -> CryptoResult<Self> {
            Err(CryptoError::Unavailable)
        }

        /// Always returns an error when encryption is disabled.
        pub fn derive_from_password(_password: &[u8], _salt: &[u8]) -> CryptoResult<Self> {
            Err(CryptoError::Unavailable)
        }
    }

    /// AES-GCM provider (stub when encryption disabled).
    #[derive(Debug, Default)]
    pub struct AesGcmProvider {
        _private: (),
    }

    impl AesGcmProvider {
        /// Creates a provider whose calls always fail.
        pub fn unavailable() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl CryptoProvider for AesGcmProvider {
        async fn encrypt(&self, _plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
            Err(CryptoError::Unavailable)
        }

        async fn decrypt(&self, _ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
            Err(CryptoError::Unavailable)
        }
    }
}

#[cfg(not(feature = "encryption"))]
pub use stub::*;
