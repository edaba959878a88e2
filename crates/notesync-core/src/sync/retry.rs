//! Exponential backoff for background sweeps.

use std::time::Duration;

use crate::config::ClientConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryBackoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl RetryBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: 0,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.retry_base_delay(), config.retry_max_delay())
    }

    /// Consecutive failures since the last reset
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    /// Delay before the next attempt: `base * 2^failures`, capped at `max`
    pub fn next_delay(&self) -> Duration {
        let factor = 1_u32.checked_shl(self.failures).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Count a failed attempt and return the delay before the next one
    pub fn record_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.next_delay()
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }
}
