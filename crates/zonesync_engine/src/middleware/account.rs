use crate::error::{RetryOperation, SyncError, SyncResult};
use crate::retry::Retrier;
use std::sync::Arc;
use tokio::sync::watch;
use zonesync_protocol::{AccountStatus, RemoteStore};

/// Publishes the remote account status.
///
/// Starts at [`AccountStatus::CouldNotDetermine`] until the first refresh.
pub struct AccountStatusMiddleware<R: RemoteStore> {
    remote: Arc<R>,
    retrier: Retrier,
    tx: watch::Sender<AccountStatus>,
}

impl<R: RemoteStore> AccountStatusMiddleware<R> {
    /// Creates the middleware.
    pub fn new(remote: Arc<R>, retrier: Retrier) -> Self {
        let (tx, _) = watch::channel(AccountStatus::CouldNotDetermine);
        Self {
            remote,
            retrier,
            tx,
        }
    }

    /// Last published status.
    pub fn status(&self) -> AccountStatus {
        *self.tx.borrow()
    }

    /// Returns true if the last published status is `Available`.
    pub fn is_available(&self) -> bool {
        self.status().is_available()
    }

    /// Subscribes to status changes.
    pub fn subscribe(&self) -> watch::Receiver<AccountStatus> {
        self.tx.subscribe()
    }

    /// Asks the remote store for the account status and publishes it.
    ///
    /// A status that cannot be read after retries is published as
    /// `CouldNotDetermine` and the error returned.
    pub async fn refresh_status(&self) -> SyncResult<AccountStatus> {
        let fetched = self
            .retrier
            .run(RetryOperation::AccountStatus, || async {
                self.remote.account_status().await.map_err(SyncError::from)
            })
            .await;

        match fetched {
            Ok(status) => {
                self.publish(status);
                Ok(status)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read account status");
                self.publish(AccountStatus::CouldNotDetermine);
                Err(e)
            }
        }
    }

    /// Handles an account-changed signal from the host.
    pub async fn account_changed(&self) -> SyncResult<AccountStatus> {
        tracing::info!("account changed, refreshing status");
        self.refresh_status().await
    }

    fn publish(&self, status: AccountStatus) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        if changed {
            tracing::info!(?status, "account status changed");
        }
    }
}
