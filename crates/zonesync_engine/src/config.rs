//! Configuration for the sync engine.

use std::path::PathBuf;
use std::time::Duration;
use zonesync_protocol::ZoneId;

/// Directory name used under the platform data directory.
const DEFAULT_APP_DIR: &str = "zonesync";

/// Configuration for a sync engine instance.
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    /// Identifier of the remote container.
    pub container_identifier: String,
    /// Name of the custom zone records are stored in.
    pub zone_name: String,
    /// Owner of the zone. `None` means the signed-in user.
    pub owner_name: Option<String>,
    /// Directory holding persisted engine state.
    pub state_dir: PathBuf,
    /// Retry configuration shared by every retryable operation.
    pub retry: RetryConfig,
    /// How long a successful zone/subscription check stays valid.
    pub environment_check_interval: Duration,
    /// Directory large payloads are staged in before upload.
    pub asset_staging_dir: PathBuf,
}

impl SyncEngineConfig {
    /// Creates a configuration with the default state directory.
    pub fn new(container_identifier: impl Into<String>, zone_name: impl Into<String>) -> Self {
        let container_identifier = container_identifier.into();
        let state_dir = default_state_dir(&container_identifier);
        Self {
            asset_staging_dir: state_dir.join("Assets"),
            container_identifier,
            zone_name: zone_name.into(),
            owner_name: None,
            state_dir,
            retry: RetryConfig::default(),
            environment_check_interval: Duration::from_secs(15 * 60),
        }
    }

    /// Sets the zone owner.
    pub fn with_owner_name(mut self, owner: impl Into<String>) -> Self {
        self.owner_name = Some(owner.into());
        self
    }

    /// Sets the state directory. The asset staging directory moves with it.
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self.asset_staging_dir = self.state_dir.join("Assets");
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the environment check interval.
    pub fn with_environment_check_interval(mut self, interval: Duration) -> Self {
        self.environment_check_interval = interval;
        self
    }

    /// Sets the asset staging directory.
    pub fn with_asset_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.asset_staging_dir = dir.into();
        self
    }

    /// Returns the zone id described by this configuration.
    pub fn zone_id(&self) -> ZoneId {
        ZoneId::new(self.zone_name.clone(), self.owner_name.clone())
    }
}

/// Returns `<data dir>/zonesync/<container>`, falling back to the working
/// directory when the platform has no data directory.
pub fn default_state_dir(container_identifier: &str) -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_APP_DIR)
        .join(container_identifier)
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Calculates the delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Add up to 25% jitter
            let jitter = delay_secs * 0.25 * rand::random::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }

    /// Delay before retrying after a failure: the provider's hint when it
    /// sent one, otherwise exponential backoff.
    pub fn delay_after_failure(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| self.delay_for_attempt(attempt))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_builder() {
        let config = SyncEngineConfig::new("iCloud.com.example.notes", "Notes")
            .with_owner_name("alice")
            .with_state_dir("/tmp/zonesync-test")
            .with_environment_check_interval(Duration::from_secs(60));

        assert_eq!(config.container_identifier, "iCloud.com.example.notes");
        assert_eq!(config.zone_id(), ZoneId::new("Notes", Some("alice".into())));
        assert_eq!(config.state_dir, PathBuf::from("/tmp/zonesync-test"));
        assert_eq!(
            config.asset_staging_dir,
            PathBuf::from("/tmp/zonesync-test/Assets")
        );
        assert_eq!(config.environment_check_interval, Duration::from_secs(60));
    }

    #[test]
    fn engine_config_defaults() {
        let config = SyncEngineConfig::new("container", "Notes");
        assert!(config.owner_name.is_none());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.environment_check_interval, Duration::from_secs(900));
        assert!(config.state_dir.ends_with("zonesync/container"));
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        // Jitter makes exact values unpredictable, but we can check bounds
        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        let delay = config.delay_for_attempt(5);
        assert!(delay <= Duration::from_millis(6250)); // 5s + 25% jitter
    }

    #[test]
    fn provider_hint_wins() {
        let config = RetryConfig::new(3).with_jitter(false);
        assert_eq!(
            config.delay_after_failure(1, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        assert_eq!(config.delay_after_failure(1, None), Duration::from_millis(500));
    }
}
