//! Retry policy and exponential backoff.

use crate::config::RequestConfig;
use std::time::Duration;

/// How many attempts an `execute()` call makes and how it waits between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RequestConfig::default())
    }
}

impl From<&RequestConfig> for RetryPolicy {
    fn from(config: &RequestConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            timeout: config.timeout,
            backoff_base: config.backoff_base,
            backoff_max: config.backoff_max,
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt with zero-based index `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        backoff_delay(attempt, self.backoff_base, self.backoff_max)
    }
}

/// `min(base * 2^attempt, max)`, saturating.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}
