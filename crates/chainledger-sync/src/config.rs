//! Synchronizer configuration.

use chainledger_core::evm::EvmMetadata;
use std::time::Duration;

use crate::http::HttpConfig;
use crate::policy::{RateLimiterConfig, RetryConfig};

const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// An address synced more recently than this is skipped.
    pub refresh_window: Duration,
    /// An address whose last on-chain action is older than this is skipped
    /// once it has been synced.
    pub retirement_window: Duration,
    /// Bound on each provider request.
    pub fetch_timeout: Duration,
    pub retry: RetryConfig,
    pub rate_limit: RateLimiterConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_window: 18 * HOUR,
            retirement_window: 360 * DAY,
            fetch_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            rate_limit: RateLimiterConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Defaults tuned per chain: Polygon addresses go quiet sooner.
    pub fn for_chain(meta: &EvmMetadata) -> Self {
        let mut config = Self::default();
        if meta.id == EvmMetadata::polygon().id {
            config.retirement_window = 90 * DAY;
        }
        config
    }

    pub(crate) fn http(&self) -> HttpConfig {
        HttpConfig {
            retry: self.retry.clone(),
            rate_limit: self.rate_limit.clone(),
            timeout: self.fetch_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.refresh_window, Duration::from_secs(18 * 3600));
        assert_eq!(config.retirement_window, Duration::from_secs(360 * 86_400));
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
        assert_eq!(
            SyncConfig::for_chain(&EvmMetadata::polygon()).retirement_window,
            Duration::from_secs(90 * 86_400)
        );
    }
}
