//! Remote account availability.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Availability of the remote account the engine syncs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountStatus {
    /// Signed in and usable.
    Available,
    /// No account is signed in.
    NoAccount,
    /// Access is restricted by policy.
    Restricted,
    /// The provider could not determine the status.
    CouldNotDetermine,
    /// Signed in but momentarily unusable.
    TemporarilyUnavailable,
}

impl AccountStatus {
    /// Returns true if sync may proceed.
    pub fn is_available(&self) -> bool {
        matches!(self, AccountStatus::Available)
    }

    /// Returns a longer, user-facing explanation of the status.
    pub fn detailed_description(&self) -> &'static str {
        match self {
            AccountStatus::Available => "Account is available and ready to use",
            AccountStatus::NoAccount => "No account found. Please sign in to enable sync",
            AccountStatus::Restricted => "Account access is restricted. Please check your settings",
            AccountStatus::CouldNotDetermine => {
                "Could not determine account status. Please try again"
            }
            AccountStatus::TemporarilyUnavailable => {
                "Account is temporarily unavailable. Please try again later"
            }
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AccountStatus::Available => "Available",
            AccountStatus::NoAccount => "No Account",
            AccountStatus::Restricted => "Restricted",
            AccountStatus::CouldNotDetermine => "Could Not Determine",
            AccountStatus::TemporarilyUnavailable => "Temporarily Unavailable",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_available_allows_sync() {
        assert!(AccountStatus::Available.is_available());
        assert!(!AccountStatus::NoAccount.is_available());
        assert!(!AccountStatus::TemporarilyUnavailable.is_available());
    }

    #[test]
    fn display() {
        assert_eq!(AccountStatus::NoAccount.to_string(), "No Account");
        assert!(AccountStatus::Restricted
            .detailed_description()
            .contains("restricted"));
    }
}
