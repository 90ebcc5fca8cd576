//! Error types for the sync engine.

use std::fmt;
use thiserror::Error;
use zonesync_protocol::RemoteError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// The retryable operation classes, used to label exhausted retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOperation {
    /// Reading the account status.
    AccountStatus,
    /// Creating the custom zone.
    ZoneCreation,
    /// Verifying the custom zone.
    ZoneCheck,
    /// Creating subscriptions.
    SubscriptionCreation,
    /// Verifying subscriptions.
    SubscriptionCheck,
    /// Uploading records.
    Upload,
    /// Deleting records.
    Deletion,
    /// Fetching zone changes.
    Fetch,
}

impl fmt::Display for RetryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetryOperation::AccountStatus => "account status check",
            RetryOperation::ZoneCreation => "zone creation",
            RetryOperation::ZoneCheck => "zone check",
            RetryOperation::SubscriptionCreation => "subscription creation",
            RetryOperation::SubscriptionCheck => "subscription check",
            RetryOperation::Upload => "upload",
            RetryOperation::Deletion => "deletion",
            RetryOperation::Fetch => "fetch",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote store rejected a request.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// A retryable operation kept failing.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Operation that was retried.
        operation: RetryOperation,
        /// Number of attempts made.
        attempts: u32,
        /// The last failure.
        #[source]
        source: RemoteError,
    },

    /// Zone or subscription setup did not complete.
    #[error("cloud environment setup failed")]
    SetupFailed,

    /// The resolved record conflicted again on resubmission.
    #[error("conflict on record {record_name} persisted after resolution")]
    ConflictUnresolved {
        /// Record that kept conflicting.
        record_name: String,
    },

    /// The batch exceeded the provider's per-request limit.
    #[error("batch of {count} records exceeds the provider limit")]
    BatchTooLarge {
        /// Records in the rejected batch.
        count: usize,
    },

    /// A record type was encountered that no model type is registered for.
    #[error("no model type registered for record type {0}")]
    UnregisteredRecordType(String),

    /// A record could not be turned into a model.
    #[error("failed to decode {record_type} record {record_name}: {message}")]
    Decode {
        /// Record type.
        record_type: String,
        /// Record name.
        record_name: String,
        /// What was wrong.
        message: String,
    },

    /// The local store rejected a call.
    #[error("local store error: {0}")]
    LocalStore(String),

    /// Persisted state could not be read or written.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted state could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Another process owns the state directory.
    #[error("state directory is locked by another process")]
    StateLocked,

    /// The work was cancelled before it completed.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a decode error.
    pub fn decode(
        record_type: impl Into<String>,
        record_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Decode {
            record_type: record_type.into(),
            record_name: record_name.into(),
            message: message.into(),
        }
    }

    /// Creates a local store error.
    pub fn local_store(message: impl Into<String>) -> Self {
        Self::LocalStore(message.into())
    }

    /// Returns the underlying remote error, if any.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            SyncError::Remote(e) => Some(e),
            SyncError::RetriesExhausted { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<ciborium::de::Error<std::io::Error>> for SyncError {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for SyncError {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        Self::Serialization(e.to_string())
    }
}
