//! # Synq Testkit
//!
//! Test utilities for Synq.
//!
//! This crate provides:
//! - An in-memory remote store with failure injection and apply hooks
//! - Crypto providers that succeed reversibly or always fail
//! - A key-value store whose writes can be made to fail
//! - Engine fixtures over a manual clock with an event recorder
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use synq_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn drains_when_online() {
//!     let t = TestEngine::online();
//!     t.queue_change("members", Operation::Insert, payload(json!({"id": "m1"})), Priority::Normal)?;
//!     t.force_sync().await?;
//!     assert_eq!(t.remote.applied().len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crypto;
pub mod fixtures;
pub mod generators;
pub mod remote;
pub mod store;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crypto::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::remote::*;
    pub use crate::store::*;
}

pub use crypto::*;
pub use fixtures::*;
pub use generators::*;
pub use remote::*;
pub use store::*;
