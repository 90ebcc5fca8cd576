//! # zonesync testkit
//!
//! Test utilities for zonesync.
//!
//! This crate provides:
//! - `Note` and `Folder` models implementing `Syncable`
//! - `TestEngine`, an engine wired to the in-memory stores in a temp dir
//! - Polling helpers for asserting on background work
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use zonesync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn first_sync() {
//!     let harness = TestEngine::new();
//!     harness.engine.perform_sync().await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod harness;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::harness::*;
}

pub use fixtures::*;
pub use generators::*;
pub use harness::*;
