use std::cmp;
use std::time::Duration;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);
pub const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(2 * 60);

/// Wait-interval state for a session's poll loop.
///
/// Each failure doubles the backoff basis up to `max`; a success resets both
/// the basis and the next delay to `default`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryBackoff {
    default: Duration,
    max: Duration,
    backoff: Duration,
    delay: Duration,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_INTERVAL, MAX_RETRY_INTERVAL)
    }
}

impl RetryBackoff {
    /// `max` below `default` is raised to `default`.
    pub fn new(default: Duration, max: Duration) -> Self {
        let max = cmp::max(max, default);
        Self {
            default,
            max,
            backoff: default,
            delay: default,
        }
    }

    /// Interval to wait before the next attempt.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn on_failure(&mut self) -> Duration {
        self.backoff = cmp::min(self.backoff.saturating_mul(2), self.max);
        self.delay = self.backoff;
        self.delay
    }

    pub fn on_success(&mut self) -> Duration {
        self.backoff = self.default;
        self.delay = self.default;
        self.delay
    }
}
