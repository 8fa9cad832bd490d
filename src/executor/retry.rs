//! Attempt budget and exponential backoff

use std::time::Duration;

/// How many backend attempts a task gets and how long to wait between
/// generic failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, shared by generic failures and rate-limit responses
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles each time
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` is at least 1.
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    /// Wait after failed attempt `attempt` (0-based): `base * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// True if another attempt follows attempt `attempt` (0-based).
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}
