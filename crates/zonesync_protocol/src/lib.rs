//! # zonesync protocol
//!
//! Wire-level types shared by the sync engine and remote record stores.
//!
//! This crate provides:
//! - `Record`, `RecordId` and `ZoneId` for the remote record model
//! - `SystemFields`, the opaque provider metadata attached to saved records
//! - `ChangeToken`, the opaque per-zone fetch cursor
//! - `Subscription` and `RemoteNotification` for push delivery
//! - `RemoteError` with the provider's error classification
//! - The `RemoteStore` trait consumed by the engine
//!
//! This crate performs no network I/O. The only filesystem access is the
//! staging of large payloads as assets (see [`Record::set_payload`]).

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod account;
mod error;
mod record;
mod store;
mod subscription;
mod token;

pub use account::AccountStatus;
pub use error::{ConflictData, RemoteError, RemoteErrorKind, RemoteResult};
pub use record::{
    Asset, FieldValue, Record, RecordId, Reference, ReferenceAction, SystemFields, ZoneId,
    CURRENT_USER_OWNER, INLINE_BYTES_LIMIT,
};
pub use store::{DeletedRecord, ModifyRecordsResult, RemoteStore, SavePolicy, ZoneChanges};
pub use subscription::{NotificationInfo, RemoteNotification, Subscription};
pub use token::ChangeToken;
