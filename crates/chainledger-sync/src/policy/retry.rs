//! Exponential backoff with a longer pause after rate-limit responses.

use std::time::Duration;

use crate::error::FetchError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    /// Cap on the exponential delay.
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Minimum pause after the provider reported a rate limit.
    pub rate_limit_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            rate_limit_backoff: Duration::from_secs(4),
        }
    }
}

/// Stateless: computes the pause before a given retry.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before the `attempt`-th retry (1-based), `None` once retries
    /// are exhausted.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.config.max_retries {
            return None;
        }
        let base_ms = self.config.initial_backoff.as_millis() as f64
            * self.config.multiplier.powi(attempt as i32 - 1);
        let capped = base_ms.min(self.config.max_backoff.as_millis() as f64);
        Some(Duration::from_millis(capped as u64))
    }

    /// Delay before retrying after `error`, `None` if it should not be retried.
    pub fn delay_for(&self, error: &FetchError, attempt: u32) -> Option<Duration> {
        if !error.is_retryable() {
            return None;
        }
        let delay = self.next_delay(attempt)?;
        if error.is_rate_limit() {
            Some(delay.max(self.config.rate_limit_backoff * attempt))
        } else {
            Some(delay)
        }
    }
}
