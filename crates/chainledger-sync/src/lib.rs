//! chainledger-sync: fetch, cache and classify EVM chain data.
//!
//! A [`ChainData`] owns the persisted [`ChainDataJson`] cache for one chain
//! and refreshes it through a pluggable [`Fetcher`]: [`EtherscanFetcher`]
//! for block-explorer APIs, [`AlchemyFetcher`] for JSON-RPC with traces.
//! Classification is delegated to `chainledger-evm`.
//!
//! ```rust,no_run
//! use chainledger_core::address_book::AddressBookJson;
//! use chainledger_sync::ChainDataBuilder;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let book = chainledger_evm::address_book(AddressBookJson::new(), &[]);
//! let mut chain_data = ChainDataBuilder::new().etherscan_key("KEY").build()?;
//! chain_data.sync_address_book(&book).await?;
//! let transactions = chain_data.get_transactions(&book, &[]);
//! # Ok(())
//! # }
//! ```
//!
//! [`ChainDataJson`]: chainledger_core::chain_data::ChainDataJson

pub mod alchemy;
pub mod builder;
pub mod chain_data;
pub mod config;
pub mod error;
pub mod etherscan;
pub mod fetcher;
pub mod http;
pub mod policy;
pub mod rpc;

pub use alchemy::AlchemyFetcher;
pub use builder::ChainDataBuilder;
pub use chain_data::{classify_history, self_addresses, ChainData, SyncReport, SyncState};
pub use config::SyncConfig;
pub use error::{ConfigError, FetchError};
pub use etherscan::EtherscanFetcher;
pub use fetcher::{FetchedHistory, Fetcher};
pub use http::{HttpClient, HttpConfig};
pub use policy::{RateLimiter, RateLimiterConfig, RetryConfig, RetryPolicy};
