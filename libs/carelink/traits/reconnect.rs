use std::time::Duration;

/// Trait for defining reconnection strategies
///
/// Implement this trait to control how the manager behaves after an
/// established connection drops unexpectedly. The first `connect()` is
/// never retried; strategies only apply to post-connection drops.
pub trait ReconnectionStrategy: Send + Sync {
    /// Get the delay before the given reconnection attempt
    ///
    /// # Arguments
    /// * `attempt` - The reconnection attempt number (1-indexed)
    ///
    /// # Returns
    /// * `Some(duration)` - Wait this long before reconnecting
    /// * `None` - Stop reconnecting
    fn next_delay(&self, attempt: u32) -> Option<Duration>;

    /// Check if we should continue reconnecting
    fn should_reconnect(&self, attempt: u32) -> bool;

    /// Highest attempt number that will be tried
    fn max_attempts(&self) -> u32;
}

/// Exponential backoff reconnection strategy
///
/// Delays between reconnection attempts grow exponentially:
/// base_delay * 2^(attempt - 1), capped at max_delay
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
}

impl ExponentialBackoff {
    /// Default base delay before the first reconnect
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

    /// Default ceiling on a single delay
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

    /// Default attempt ceiling
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    /// Create a new exponential backoff strategy
    ///
    /// # Arguments
    /// * `base_delay` - The delay before the first reconnect
    /// * `max_delay` - The maximum delay between reconnects
    /// * `max_attempts` - Number of attempts before giving up
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_BASE_DELAY,
            Self::DEFAULT_MAX_DELAY,
            Self::DEFAULT_MAX_ATTEMPTS,
        )
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if !self.should_reconnect(attempt) {
            return None;
        }

        let factor = 2u64.saturating_pow(attempt - 1);
        let delay = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        let delay = Duration::from_millis(delay.min(self.max_delay.as_millis() as u64));
        Some(delay)
    }

    fn should_reconnect(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Never reconnect strategy
///
/// The first unexpected drop is immediately fatal.
#[derive(Debug, Clone)]
pub struct NeverReconnect;

impl ReconnectionStrategy for NeverReconnect {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        None
    }

    fn should_reconnect(&self, _attempt: u32) -> bool {
        false
    }

    fn max_attempts(&self) -> u32 {
        0
    }
}
