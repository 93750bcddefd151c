#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::backoff::Constant;
use bon::Builder;

/// Read timeout applied when the caller passes `0` seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

const DEFAULT_READ_TIMEOUT_DURATION: Duration = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
const DEFAULT_PING_INTERVAL_DURATION: Duration = Duration::from_secs(15);
const DEFAULT_RECONNECT_DELAY_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_EVENT_CAPACITY: usize = 1;

/// Configuration for the certstream WebSocket client.
///
/// Pick a `read_timeout` larger than `ping_interval`, otherwise a quiet feed
/// will time out before the ping can keep the connection alive.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Maximum time to wait for the next data frame before reconnecting
    #[builder(default = DEFAULT_READ_TIMEOUT_DURATION)]
    pub read_timeout: Duration,
    /// Interval for sending PING frames to keep the connection alive
    #[builder(default = DEFAULT_PING_INTERVAL_DURATION)]
    pub ping_interval: Duration,
    /// Drop server `heartbeat` events instead of publishing them
    #[builder(default)]
    pub skip_heartbeats: bool,
    /// Capacity of the event channel. Small values keep the reader in lockstep
    /// with the consumer.
    #[builder(default = DEFAULT_EVENT_CAPACITY)]
    pub event_capacity: usize,
    /// Reconnection strategy configuration
    #[builder(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Config {
    /// Build a configuration from a whole-second read timeout, where `0`
    /// selects [`DEFAULT_TIMEOUT_SECS`].
    #[must_use]
    pub fn with_timeout_secs(skip_heartbeats: bool, timeout_secs: u64) -> Self {
        let timeout_secs = if timeout_secs == 0 {
            DEFAULT_TIMEOUT_SECS
        } else {
            timeout_secs
        };

        Self::builder()
            .skip_heartbeats(skip_heartbeats)
            .read_timeout(Duration::from_secs(timeout_secs))
            .build()
    }
}

/// Configuration for automatic reconnection behavior.
///
/// Reconnection never gives up: every failure is followed by the same fixed
/// delay and another attempt.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct ReconnectConfig {
    /// Delay between a failure and the next connection attempt
    #[builder(default = DEFAULT_RECONNECT_DELAY_DURATION)]
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<ReconnectConfig> for Constant {
    fn from(config: ReconnectConfig) -> Self {
        Constant::new(config.delay)
    }
}
