//! Errors reported by remote record stores.

use crate::record::Record;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for remote store calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Classification of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    /// No route to the provider.
    NetworkUnavailable,
    /// The connection failed mid-request.
    NetworkFailure,
    /// The provider is down or overloaded.
    ServiceUnavailable,
    /// The client is sending too many requests.
    RequestRateLimited,
    /// The zone is busy with another operation.
    ZoneBusy,
    /// The zone does not exist.
    ZoneNotFound,
    /// The user deleted the zone.
    UserDeletedZone,
    /// The record or subscription does not exist.
    UnknownItem,
    /// The save was rejected because the server copy changed.
    ServerRecordChanged,
    /// The change token is no longer valid.
    ChangeTokenExpired,
    /// The request carried more items than the provider accepts.
    LimitExceeded,
    /// The account is not authenticated.
    NotAuthenticated,
    /// The account lacks permission for the request.
    PermissionFailure,
    /// The account is out of storage.
    QuotaExceeded,
    /// Unclassified provider failure.
    Internal,
}

impl RemoteErrorKind {
    /// Returns true for failures that usually clear on their own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteErrorKind::NetworkUnavailable
                | RemoteErrorKind::NetworkFailure
                | RemoteErrorKind::ServiceUnavailable
                | RemoteErrorKind::RequestRateLimited
                | RemoteErrorKind::ZoneBusy
        )
    }

    fn as_str(&self) -> &'static str {
        match self {
            RemoteErrorKind::NetworkUnavailable => "network unavailable",
            RemoteErrorKind::NetworkFailure => "network failure",
            RemoteErrorKind::ServiceUnavailable => "service unavailable",
            RemoteErrorKind::RequestRateLimited => "request rate limited",
            RemoteErrorKind::ZoneBusy => "zone busy",
            RemoteErrorKind::ZoneNotFound => "zone not found",
            RemoteErrorKind::UserDeletedZone => "user deleted zone",
            RemoteErrorKind::UnknownItem => "unknown item",
            RemoteErrorKind::ServerRecordChanged => "server record changed",
            RemoteErrorKind::ChangeTokenExpired => "change token expired",
            RemoteErrorKind::LimitExceeded => "limit exceeded",
            RemoteErrorKind::NotAuthenticated => "not authenticated",
            RemoteErrorKind::PermissionFailure => "permission failure",
            RemoteErrorKind::QuotaExceeded => "quota exceeded",
            RemoteErrorKind::Internal => "internal error",
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two colliding snapshots of an optimistic-concurrency failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictData {
    /// The record this client tried to save.
    pub client_record: Record,
    /// The authoritative copy currently on the server.
    pub server_record: Record,
}

/// A failure reported by a remote record store.
#[derive(Error, Debug, Clone)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    /// Failure class.
    pub kind: RemoteErrorKind,
    /// Provider message.
    pub message: String,
    /// Provider-suggested delay before retrying, if any.
    pub retry_after: Option<Duration>,
    conflict: Option<Box<ConflictData>>,
}

impl RemoteError {
    /// Creates an error of the given kind.
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
            conflict: None,
        }
    }

    /// Creates a `ServerRecordChanged` error carrying both snapshots.
    pub fn server_record_changed(client_record: Record, server_record: Record) -> Self {
        let message = format!("record {} changed on server", client_record.id);
        Self {
            kind: RemoteErrorKind::ServerRecordChanged,
            message,
            retry_after: None,
            conflict: Some(Box::new(ConflictData {
                client_record,
                server_record,
            })),
        }
    }

    /// Attaches a provider-suggested retry delay.
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    /// Returns the conflict snapshots when this is a resolvable conflict.
    ///
    /// A `ServerRecordChanged` error without both snapshots cannot be
    /// resolved and yields `None`.
    pub fn conflict_data(&self) -> Option<&ConflictData> {
        if self.kind == RemoteErrorKind::ServerRecordChanged {
            self.conflict.as_deref()
        } else {
            None
        }
    }

    /// Returns true when the zone is gone (not found or deleted by the user).
    pub fn is_zone_deleted(&self) -> bool {
        matches!(
            self.kind,
            RemoteErrorKind::ZoneNotFound | RemoteErrorKind::UserDeletedZone
        )
    }

    /// Returns true when the addressed item does not exist.
    pub fn is_unknown_item(&self) -> bool {
        self.kind == RemoteErrorKind::UnknownItem
    }

    /// Returns true if the operation may succeed when repeated later.
    pub fn is_retryable(&self) -> bool {
        self.retry_after.is_some() || self.kind.is_transient()
    }
}
