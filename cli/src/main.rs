//! ChainLedger CLI: sync EVM chain data and print classified transactions.
//!
//! # Commands
//! ```text
//! chainledger sync         [--address <0x..>]...
//! chainledger transactions [--pretty]
//! chainledger transaction  <hash> [--sync] [--pretty]
//! chainledger validate
//! ```

use anyhow::{bail, Context, Result};
use chainledger_core::address_book::{AddressBook, AddressBookJson};
use chainledger_core::chain_data::ChainDataJson;
use chainledger_core::evm::EvmMetadata;
use chainledger_core::store::{chain_data_key, Store, ADDRESS_BOOK_KEY};
use chainledger_sync::{ChainData, ChainDataBuilder};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

mod cmd_show;
mod cmd_sync;
mod cmd_validate;
mod logging;
mod store;

use logging::{init_tracing, LogConfig};
use store::FileStore;

#[derive(Parser)]
#[command(
    name = "chainledger",
    about = "Sync EVM transaction history and classify it into accounting transfers",
    long_about = "
ChainLedger CLI: fetch the history of your own addresses from Etherscan or
Alchemy, cache it on disk and print it as classified transactions.

ENVIRONMENT VARIABLES:
  CHAINLEDGER_DATA_DIR   Directory holding AddressBook.json and <Chain>Data.json
  ETHERSCAN_KEY          Etherscan / Polygonscan API key
  ALCHEMY_URL            Alchemy JSON-RPC endpoint (preferred over Etherscan)
",
    version
)]
struct Cli {
    /// Chain to operate on
    #[arg(long, global = true, default_value = "ethereum")]
    chain: String,

    /// Directory for persisted documents
    #[arg(long, global = true, env = "CHAINLEDGER_DATA_DIR", default_value = "./chainledger-data")]
    data_dir: PathBuf,

    #[arg(long, global = true, env = "ETHERSCAN_KEY", hide_env_values = true)]
    etherscan_key: Option<String>,

    #[arg(long, global = true, env = "ALCHEMY_URL", hide_env_values = true)]
    alchemy_url: Option<String>,

    /// Default log level
    #[arg(long, global = true, env = "CHAINLEDGER_LOG", default_value = "info")]
    log_level: String,

    /// Per-crate log level, eg `chainledger-sync=debug` (repeatable)
    #[arg(long = "log", global = true)]
    log_overrides: Vec<String>,

    /// Emit JSON logs on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh the history of every self address in the address book
    Sync {
        /// Add a self address before syncing (repeatable)
        #[arg(long = "address")]
        addresses: Vec<String>,
    },

    /// Print every cached transaction, classified
    Transactions {
        #[arg(long)]
        pretty: bool,
    },

    /// Print one classified transaction
    Transaction {
        /// Transaction hash (0x + 64 hex)
        hash: String,
        /// Fetch it first if it is not cached
        #[arg(long)]
        sync: bool,
        #[arg(long)]
        pretty: bool,
    },

    /// Check the persisted documents for structural errors
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(
        &LogConfig {
            level: cli.log_level.clone(),
            json: cli.log_json,
            ..Default::default()
        }
        .with_overrides(&cli.log_overrides),
    );

    let ctx = Session::open(&cli)?;

    match cli.command {
        Commands::Sync { addresses } => cmd_sync::run(&ctx, &addresses).await,
        Commands::Transactions { pretty } => cmd_show::transactions(&ctx, pretty).await,
        Commands::Transaction { hash, sync, pretty } => {
            cmd_show::transaction(&ctx, &hash, sync, pretty).await
        }
        Commands::Validate => cmd_validate::run(&ctx).await,
    }
}

// ─── Shared session ──────────────────────────────────────────────────────────

/// Everything a command needs: chain, store and provider credentials.
pub(crate) struct Session {
    pub meta: EvmMetadata,
    pub store: Arc<FileStore>,
    etherscan_key: Option<String>,
    alchemy_url: Option<String>,
}

impl Session {
    fn open(cli: &Cli) -> Result<Self> {
        Ok(Self {
            meta: chain_metadata(&cli.chain)?,
            store: Arc::new(FileStore::new(&cli.data_dir)),
            etherscan_key: cli.etherscan_key.clone().filter(|k| !k.trim().is_empty()),
            alchemy_url: cli.alchemy_url.clone().filter(|u| !u.trim().is_empty()),
        })
    }

    pub fn chain_key(&self) -> String {
        chain_data_key(&self.meta.name)
    }

    /// The saved address book, or an empty one. A malformed document is
    /// reported and ignored.
    pub async fn address_book_json(&self) -> Result<AddressBookJson> {
        let Some(value) = self.store.load(ADDRESS_BOOK_KEY).await? else {
            return Ok(AddressBookJson::new());
        };
        match serde_json::from_value(value) {
            Ok(json) => Ok(json),
            Err(e) => {
                tracing::warn!(error = %e, "address book is malformed, starting empty");
                Ok(AddressBookJson::new())
            }
        }
    }

    /// User entries merged with the built-in registry.
    pub async fn address_book(&self) -> Result<AddressBook> {
        Ok(chainledger_evm::address_book(self.address_book_json().await?, &[]))
    }

    pub async fn save_address_book(&self, book: &AddressBook) -> Result<()> {
        let value = serde_json::to_value(book.json())?;
        self.store
            .save(ADDRESS_BOOK_KEY, &value)
            .await
            .context("saving address book")
    }

    /// The cached chain data, read without any provider.
    pub async fn chain_data_json(&self) -> Result<ChainDataJson> {
        let value = self.store.load(&self.chain_key()).await?;
        Ok(value.map(ChainDataJson::from_value).unwrap_or_default())
    }

    /// A synchronizer backed by the file store, restored from disk.
    pub async fn chain_data(&self) -> Result<ChainData> {
        let mut builder = ChainDataBuilder::new()
            .metadata(self.meta.clone())
            .store(self.store.clone());
        if let Some(url) = &self.alchemy_url {
            builder = builder.alchemy_url(url);
        }
        if let Some(key) = &self.etherscan_key {
            builder = builder.etherscan_key(key);
        }
        let mut chain_data = builder
            .build()
            .context("configure ETHERSCAN_KEY or ALCHEMY_URL to sync")?;
        let cached = chain_data.restore().await?;
        tracing::info!(
            chain = %self.meta.name,
            provider = chain_data.fetcher_name(),
            cached,
            "chain data restored"
        );
        Ok(chain_data)
    }
}

fn chain_metadata(chain: &str) -> Result<EvmMetadata> {
    match chain.to_ascii_lowercase().as_str() {
        "ethereum" | "mainnet" | "1" => Ok(EvmMetadata::ethereum()),
        "polygon" | "matic" | "137" => Ok(EvmMetadata::polygon()),
        other => bail!("unsupported chain {other:?}, expected ethereum or polygon"),
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_names() {
        assert_eq!(chain_metadata("Ethereum").unwrap().id, 1);
        assert_eq!(chain_metadata("polygon").unwrap().id, 137);
        assert!(chain_metadata("solana").is_err());
    }

    #[test]
    fn cli_parses_global_flags_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "chainledger",
            "sync",
            "--address",
            "0x1111111111111111111111111111111111111111",
            "--chain",
            "polygon",
            "--log",
            "chainledger-sync=debug",
        ])
        .unwrap();
        assert_eq!(cli.chain, "polygon");
        assert_eq!(cli.log_overrides, vec!["chainledger-sync=debug"]);
        match cli.command {
            Commands::Sync { addresses } => assert_eq!(addresses.len(), 1),
            _ => panic!("expected sync"),
        }
    }
}
