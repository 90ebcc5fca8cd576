//! Error types for the reference store.

use thiserror::Error;
use zonesync_protocol::{RemoteError, RemoteErrorKind, ZoneId};

/// Result type for internal store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures raised inside the store before they reach a client.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The zone does not exist.
    #[error("zone {0} not found")]
    ZoneNotFound(ZoneId),

    /// The subscription or record does not exist.
    #[error("unknown item: {0}")]
    UnknownItem(String),

    /// A batch carried more items than allowed.
    #[error("batch of {count} items exceeds limit of {limit}")]
    LimitExceeded {
        /// Items in the batch.
        count: usize,
        /// Configured limit.
        limit: usize,
    },

    /// System fields or a change token could not be decoded.
    #[error("malformed {what}: {message}")]
    Malformed {
        /// What was being decoded.
        what: &'static str,
        /// Decoder message.
        message: String,
    },

    /// A change token from an earlier epoch was presented.
    #[error("change token expired")]
    TokenExpired,
}

impl StoreError {
    /// Creates a decode error.
    pub fn malformed(what: &'static str, message: impl ToString) -> Self {
        Self::Malformed {
            what,
            message: message.to_string(),
        }
    }

    /// Returns the provider error kind this failure is reported as.
    pub fn kind(&self) -> RemoteErrorKind {
        match self {
            StoreError::ZoneNotFound(_) => RemoteErrorKind::ZoneNotFound,
            StoreError::UnknownItem(_) => RemoteErrorKind::UnknownItem,
            StoreError::LimitExceeded { .. } => RemoteErrorKind::LimitExceeded,
            StoreError::Malformed { .. } => RemoteErrorKind::Internal,
            StoreError::TokenExpired => RemoteErrorKind::ChangeTokenExpired,
        }
    }
}

impl From<StoreError> for RemoteError {
    fn from(e: StoreError) -> Self {
        RemoteError::new(e.kind(), e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        let zone = ZoneId::new("Notes", None);
        assert_eq!(
            RemoteError::from(StoreError::ZoneNotFound(zone)).kind,
            RemoteErrorKind::ZoneNotFound
        );
        assert_eq!(
            RemoteError::from(StoreError::TokenExpired).kind,
            RemoteErrorKind::ChangeTokenExpired
        );
        assert_eq!(
            StoreError::malformed("token", "eof").kind(),
            RemoteErrorKind::Internal
        );
    }

    #[test]
    fn error_display() {
        let err = StoreError::LimitExceeded {
            count: 500,
            limit: 400,
        };
        let msg = err.to_string();
        assert!(msg.contains("500"));
        assert!(msg.contains("400"));
    }
}
