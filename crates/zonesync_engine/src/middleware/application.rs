use tokio::sync::watch;

/// Foreground state of the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationState {
    /// In the foreground.
    Active,
    /// Suspended or in the background.
    Background,
}

/// Publishes the host application's foreground state.
pub struct ApplicationStateMiddleware {
    tx: watch::Sender<ApplicationState>,
}

impl ApplicationStateMiddleware {
    /// Creates the middleware in the given state.
    pub fn new(initial: ApplicationState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Last published state.
    pub fn state(&self) -> ApplicationState {
        *self.tx.borrow()
    }

    /// Publishes a new state. Returns true if the value changed.
    pub fn set_state(&self, state: ApplicationState) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            tracing::debug!(?state, "application state changed");
        }
        changed
    }

    /// Shorthand for entering the foreground.
    pub fn did_become_active(&self) -> bool {
        self.set_state(ApplicationState::Active)
    }

    /// Shorthand for leaving the foreground.
    pub fn did_enter_background(&self) -> bool {
        self.set_state(ApplicationState::Background)
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ApplicationState> {
        self.tx.subscribe()
    }
}

impl Default for ApplicationStateMiddleware {
    fn default() -> Self {
        Self::new(ApplicationState::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_published_once() {
        let app = ApplicationStateMiddleware::default();
        let rx = app.subscribe();

        assert!(!app.did_become_active());
        assert!(app.did_enter_background());
        assert!(!app.did_enter_background());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow(), ApplicationState::Background);
        assert_eq!(app.state(), ApplicationState::Background);
    }
}
