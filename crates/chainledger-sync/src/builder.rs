//! Fluent builder for [`ChainData`].
//!
//! # Example
//!
//! ```rust,no_run
//! use chainledger_sync::ChainDataBuilder;
//! use chainledger_core::evm::EvmMetadata;
//!
//! let chain_data = ChainDataBuilder::new()
//!     .metadata(EvmMetadata::ethereum())
//!     .etherscan_key("YOUR_KEY")
//!     .build()
//!     .expect("a fetcher is configured");
//! ```

use chainledger_core::chain_data::ChainDataJson;
use chainledger_core::evm::EvmMetadata;
use chainledger_core::store::Store;
use std::sync::Arc;
use std::time::Duration;

use crate::alchemy::AlchemyFetcher;
use crate::chain_data::ChainData;
use crate::config::SyncConfig;
use crate::error::ConfigError;
use crate::etherscan::EtherscanFetcher;
use crate::fetcher::Fetcher;
use crate::policy::{RateLimiterConfig, RetryConfig};

/// Builder for a per-chain [`ChainData`] synchronizer.
///
/// Fetcher precedence: an explicit [`fetcher`](Self::fetcher), then Alchemy,
/// then Etherscan.
#[derive(Default)]
pub struct ChainDataBuilder {
    meta: Option<EvmMetadata>,
    etherscan_key: Option<String>,
    alchemy_url: Option<String>,
    fetcher: Option<Arc<dyn Fetcher>>,
    store: Option<Arc<dyn Store>>,
    json: Option<ChainDataJson>,
    config: Option<SyncConfig>,
    refresh_window: Option<Duration>,
    retirement_window: Option<Duration>,
    fetch_timeout: Option<Duration>,
    retry: Option<RetryConfig>,
    rate_limit: Option<RateLimiterConfig>,
}

impl ChainDataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain to sync. Defaults to Ethereum.
    pub fn metadata(mut self, meta: EvmMetadata) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn etherscan_key(mut self, key: impl Into<String>) -> Self {
        self.etherscan_key = Some(key.into());
        self
    }

    pub fn alchemy_url(mut self, url: impl Into<String>) -> Self {
        self.alchemy_url = Some(url.into());
        self
    }

    /// Use a custom provider.
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Persist after every change.
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Start from an existing document instead of an empty cache.
    pub fn json(mut self, json: ChainDataJson) -> Self {
        self.json = Some(json);
        self
    }

    /// Replace the whole configuration. Individual setters still apply on top.
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = Some(window);
        self
    }

    pub fn retirement_window(mut self, window: Duration) -> Self {
        self.retirement_window = Some(window);
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn rate_limit(mut self, rate_limit: RateLimiterConfig) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    fn resolve_config(&mut self, meta: &EvmMetadata) -> SyncConfig {
        let mut config = self.config.take().unwrap_or_else(|| SyncConfig::for_chain(meta));
        if let Some(window) = self.refresh_window {
            config.refresh_window = window;
        }
        if let Some(window) = self.retirement_window {
            config.retirement_window = window;
        }
        if let Some(timeout) = self.fetch_timeout {
            config.fetch_timeout = timeout;
        }
        if let Some(retry) = self.retry.take() {
            config.retry = retry;
        }
        if let Some(rate_limit) = self.rate_limit.take() {
            config.rate_limit = rate_limit;
        }
        config
    }

    /// Build the synchronizer. Fails only when no usable fetcher is
    /// configured.
    pub fn build(mut self) -> Result<ChainData, ConfigError> {
        let meta = self.meta.take().unwrap_or_else(EvmMetadata::ethereum);
        let config = self.resolve_config(&meta);

        let fetcher: Arc<dyn Fetcher> = match (self.fetcher, self.alchemy_url, self.etherscan_key) {
            (Some(fetcher), _, _) => fetcher,
            (None, Some(url), _) => Arc::new(AlchemyFetcher::new(&url, config.http())?),
            (None, None, Some(key)) => Arc::new(EtherscanFetcher::new(&key, &meta, config.http())?),
            (None, None, None) => return Err(ConfigError::MissingFetcher),
        };

        Ok(ChainData::new(
            meta,
            self.json.unwrap_or_default(),
            fetcher,
            self.store,
            config,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn building_without_a_fetcher_fails() {
        let result = ChainDataBuilder::new().build();
        assert!(matches!(result, Err(ConfigError::MissingFetcher)));
    }

    #[test]
    fn etherscan_from_key() {
        let chain_data = ChainDataBuilder::new()
            .metadata(EvmMetadata::polygon())
            .etherscan_key("key")
            .refresh_window(Duration::from_secs(60))
            .build()
            .unwrap();
        assert_eq!(chain_data.metadata().name, "Polygon");
        assert_eq!(chain_data.config().refresh_window, Duration::from_secs(60));
        assert_eq!(chain_data.config().retirement_window, Duration::from_secs(90 * 86_400));
    }

    #[test]
    fn alchemy_wins_over_etherscan() {
        let chain_data = ChainDataBuilder::new()
            .etherscan_key("key")
            .alchemy_url("https://eth-mainnet.g.alchemy.com/v2/abc")
            .build()
            .unwrap();
        assert_eq!(chain_data.fetcher_name(), "alchemy");
    }

    #[test]
    fn blank_key_is_rejected() {
        let result = ChainDataBuilder::new().etherscan_key("").build();
        assert!(matches!(result, Err(ConfigError::MissingApiKey { .. })));
    }
}
