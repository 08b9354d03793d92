//! Exponential backoff schedule for callback retries
//!
//! Stateless by design: the attempt counter lives on the callback-log row, so
//! a policy value can be rebuilt from tenant configuration on every pass.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff with a cap and a retry budget.
///
/// Embedded in tenant configuration JSON, hence the millisecond fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { initial_interval_ms: 1_000, max_interval_ms: 30_000, max_attempts: 3 }
    }
}

impl RetryPolicy {
    pub fn new(initial_interval: Duration, max_interval: Duration, max_attempts: u32) -> Self {
        Self {
            initial_interval_ms: initial_interval.as_millis() as u64,
            max_interval_ms: max_interval.as_millis() as u64,
            max_attempts,
        }
    }

    /// Delay before the retry that follows `attempt` completed attempts, and
    /// whether any retry remains after that one.
    ///
    /// `delay = min(initial * 2^attempt, max)`.
    pub fn next(&self, attempt: u32) -> (Duration, bool) {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let delay_ms = self
            .initial_interval_ms
            .checked_mul(factor)
            .unwrap_or(self.max_interval_ms)
            .min(self.max_interval_ms);

        (Duration::from_millis(delay_ms), attempt + 1 < self.max_attempts)
    }
}
