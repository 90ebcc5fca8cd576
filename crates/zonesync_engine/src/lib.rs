//! # zonesync engine
//!
//! Bidirectional sync between a local store and a remote record store.
//!
//! This crate provides:
//! - The sync engine (preconditions, environment setup, upload, fetch)
//! - Change token persistence
//! - Zone and subscription provisioning
//! - A durable queue of deletions made while offline
//! - Environment middlewares (network, account, application state)
//! - Single-flight serialization of sync work
//! - Retry with exponential backoff
//!
//! ## Architecture
//!
//! A sync pass runs **deletions, then uploads, then fetches**:
//! 1. Flush deletions queued while offline
//! 2. Upload buffered local models, resolving conflicts once
//! 3. Fetch remote changes page by page, persisting the token per page
//!
//! ## Key Invariants
//!
//! - At most one pipeline runs at a time
//! - A change token is persisted only after its page was delivered
//! - Queued deletions leave the queue only once the store confirmed them
//! - A conflict is resolved at most once per upload attempt
//! - Unavailable network or account is not an error

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod local;
mod middleware;
mod pending;
mod retry;
mod serial;
mod settings;
mod subscription;
mod syncable;
mod token;
mod zone;

pub use config::{default_state_dir, RetryConfig, SyncEngineConfig};
pub use engine::{SyncEngine, SyncState, SyncStats};
pub use error::{RetryOperation, SyncError, SyncResult};
pub use local::{LocalStore, MemoryLocalStore};
pub use middleware::{
    AccountStatusMiddleware, ApplicationState, ApplicationStateMiddleware,
    NetworkStatusMiddleware,
};
pub use pending::{PendingOperation, PendingOperationsManager};
pub use retry::Retrier;
pub use serial::SerialTasks;
pub use settings::{
    subscription_registry_key, token_key, zone_created_key, FileSettingsStore,
    MemorySettingsStore, SettingsStore, StateDir,
};
pub use subscription::{load_registry, SubscriptionManager, SubscriptionRegistry};
pub use syncable::{
    client_wins, server_wins, ModelsByType, RecordCodec, RecordContext, SyncModel, Syncable,
    TypeRegistry,
};
pub use token::TokenManager;
pub use zone::ZoneManager;

pub use zonesync_protocol as protocol;
