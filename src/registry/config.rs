//! Registry configuration

use std::time::Duration;

/// Fan-out tuning shared by the registry, the broadcaster and keep-alive tasks
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Frames buffered per subscriber before a push counts as failed
    pub subscriber_buffer: usize,

    /// Delay before the single re-check when a room has no subscribers
    pub retry_delay: Duration,

    /// Period between keep-alive pings on each connection
    pub keepalive_interval: Duration,

    /// How often empty rooms are pruned
    pub cleanup_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 64,
            retry_delay: Duration::from_millis(100),
            keepalive_interval: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl RegistryConfig {
    /// Set the per-subscriber channel capacity (minimum 1)
    pub fn subscriber_buffer(mut self, frames: usize) -> Self {
        self.subscriber_buffer = frames.max(1);
        self
    }

    /// Set the no-subscriber retry delay
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the keep-alive ping period
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set the empty-room cleanup period
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}
