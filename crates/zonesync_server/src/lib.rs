//! # zonesync server
//!
//! Reference remote record store for zonesync.
//!
//! This crate provides:
//! - `MemoryRecordStore`, an in-memory implementation of `RemoteStore`
//! - Optimistic concurrency through change tags encoded in system fields
//! - A per-zone change log served in pages behind opaque change tokens
//! - Fault injection and call history for tests
//!
//! # Example
//!
//! ```rust,ignore
//! use zonesync_server::{MemoryRecordStore, ServerConfig, StoreMethod};
//!
//! let store = MemoryRecordStore::new(ServerConfig::new().with_page_size(10));
//! store.fail_next(StoreMethod::FetchZone, network_error);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod changelog;
mod config;
mod error;
mod faults;
mod store;

pub use config::ServerConfig;
pub use error::{StoreError, StoreResult};
pub use faults::StoreMethod;
pub use store::MemoryRecordStore;
