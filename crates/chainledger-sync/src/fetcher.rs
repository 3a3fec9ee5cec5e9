//! The provider contract every chain-data source implements.

use async_trait::async_trait;
use chainledger_core::evm::{EvmTransaction, EvmTransfer};

use crate::error::FetchError;

/// What a provider knows about an address's past.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedHistory {
    /// Every transaction hash touching the address, sorted and deduplicated.
    pub hashes: Vec<String>,
    /// Internal value calls discovered along the way, if the provider lists
    /// them per address.
    pub calls: Vec<EvmTransfer>,
}

impl FetchedHistory {
    pub fn new(mut hashes: Vec<String>, calls: Vec<EvmTransfer>) -> Self {
        for hash in hashes.iter_mut() {
            *hash = hash.to_lowercase();
        }
        hashes.sort();
        hashes.dedup();
        Self { hashes, calls }
    }
}

/// A chain-data provider.
///
/// Implementations must normalise to the same [`EvmTransaction`] shape, with
/// internal calls in `transfers`, so providers are interchangeable.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    async fn fetch_history(&self, address: &str) -> Result<FetchedHistory, FetchError>;

    async fn fetch_transaction(&self, hash: &str) -> Result<EvmTransaction, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_sorted_and_deduplicated() {
        let h = FetchedHistory::new(vec!["0xBB".into(), "0xaa".into(), "0xbb".into()], vec![]);
        assert_eq!(h.hashes, vec!["0xaa".to_string(), "0xbb".to_string()]);
    }
}
