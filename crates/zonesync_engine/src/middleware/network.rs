use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishes whether the remote store is reachable.
///
/// The value is set by the host (from an OS reachability callback) or by
/// the optional TCP probe started with [`NetworkStatusMiddleware::start_probe`].
pub struct NetworkStatusMiddleware {
    tx: watch::Sender<bool>,
    probe: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkStatusMiddleware {
    /// Creates the middleware with an initial reachability.
    pub fn new(initially_available: bool) -> Self {
        let (tx, _) = watch::channel(initially_available);
        Self {
            tx,
            probe: Mutex::new(None),
        }
    }

    /// Last published reachability.
    pub fn is_available(&self) -> bool {
        *self.tx.borrow()
    }

    /// Publishes a new reachability. Returns true if the value changed.
    pub fn set_available(&self, available: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == available {
                return false;
            }
            *current = available;
            true
        });
        if changed {
            tracing::info!(available, "network status changed");
        }
        changed
    }

    /// Subscribes to reachability changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Periodically connects to `addr` and publishes whether it succeeded.
    ///
    /// Replaces any running probe. The probe stops when the middleware is
    /// dropped or [`NetworkStatusMiddleware::stop_probe`] is called.
    pub fn start_probe(self: &Arc<Self>, addr: impl Into<String>, interval: Duration) {
        let addr = addr.into();
        let weak: Weak<Self> = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            loop {
                let reachable = matches!(
                    tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(addr.as_str())).await,
                    Ok(Ok(_))
                );
                match weak.upgrade() {
                    Some(middleware) => {
                        middleware.set_available(reachable);
                    }
                    None => break,
                }
                tokio::time::sleep(interval).await;
            }
        });

        if let Some(previous) = self.probe.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stops the reachability probe, if running.
    pub fn stop_probe(&self) {
        if let Some(handle) = self.probe.lock().take() {
            handle.abort();
        }
    }
}

impl Default for NetworkStatusMiddleware {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Drop for NetworkStatusMiddleware {
    fn drop(&mut self) {
        self.stop_probe();
    }
}
