//! Chunk retry budget and backoff.

use std::time::Duration;

/// How failed chunk transfers are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first failure of a chunk.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub backoff: Duration,
    /// Upper bound of the delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Returns `true` if a chunk that failed `failures` times may be retried.
    pub fn should_retry(&self, failures: u32) -> bool {
        failures <= self.max_retries
    }

    /// Delay before retrying a chunk that failed `failures` times.
    ///
    /// Doubles with each failure: `backoff`, `2 × backoff`, `4 × backoff`...
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}
