#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

const DEFAULT_CONNECT_TIMEOUT_DURATION: Duration = Duration::from_secs(10);
const DEFAULT_START_COALESCE_DURATION: Duration = Duration::from_millis(1200);
const DEFAULT_TEARDOWN_GRACE_DURATION: Duration = Duration::from_millis(500);
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Configuration for the notification stream client.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    /// Timeout for establishing the HTTP connection
    pub connect_timeout: Duration,
    /// How long to wait after the first listener registers before actually
    /// starting a session. Absorbs mount/unmount/remount churn from UI
    /// lifecycles that double-invoke effects: if every listener is gone again
    /// before the delay elapses, no connection is made at all.
    pub start_coalesce: Duration,
    /// How long the session is kept alive after the last listener leaves,
    /// so brief churn does not flap the connection
    pub teardown_grace: Duration,
    /// Reconnection strategy configuration
    pub reconnect: ReconnectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_DURATION,
            start_coalesce: DEFAULT_START_COALESCE_DURATION,
            teardown_grace: DEFAULT_TEARDOWN_GRACE_DURATION,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Configuration for automatic reconnection behavior.
///
/// Delays grow as `initial_backoff * multiplier^n` up to `max_backoff` and are
/// reset to the floor whenever the session parses a frame, heartbeats
/// included.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
    /// Initial backoff duration for the first reconnection attempt
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None, // Infinite reconnection by default
            initial_backoff: DEFAULT_INITIAL_BACKOFF_DURATION,
            max_backoff: DEFAULT_MAX_BACKOFF_DURATION,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl From<ReconnectConfig> for ExponentialBackoff {
    fn from(config: ReconnectConfig) -> Self {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(config.initial_backoff)
            .with_max_interval(config.max_backoff)
            .with_multiplier(config.backoff_multiplier)
            .with_randomization_factor(0.0) // deterministic delays
            .with_max_elapsed_time(None) // We handle max attempts separately
            .build()
    }
}

#[cfg(test)]
mod tests {
    use backoff::backoff::Backoff as _;

    use super::*;

    #[test]
    fn backoff_doubles_from_one_second() {
        let config = ReconnectConfig::default();
        let mut backoff: ExponentialBackoff = config.into();

        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(1000)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(2000)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(4000)));
    }

    #[test]
    fn backoff_is_capped_at_thirty_seconds() {
        let config = ReconnectConfig::default();
        let mut backoff: ExponentialBackoff = config.into();

        for _ in 0..10 {
            let _next = backoff.next_backoff();
        }

        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(30)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn backoff_reset_returns_to_floor() {
        let config = ReconnectConfig::default();
        let mut backoff: ExponentialBackoff = config.into();

        let _first = backoff.next_backoff();
        let _second = backoff.next_backoff();
        backoff.reset();

        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn default_timings_match_ui_lifecycle_tuning() {
        let config = Config::default();
        assert_eq!(config.start_coalesce, Duration::from_millis(1200));
        assert_eq!(config.teardown_grace, Duration::from_millis(500));
        assert_eq!(config.reconnect.initial_backoff, Duration::from_secs(1));
        assert_eq!(config.reconnect.max_backoff, Duration::from_secs(30));
        assert!(config.reconnect.max_attempts.is_none());
    }
}
