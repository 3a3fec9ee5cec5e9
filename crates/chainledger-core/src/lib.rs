//! chainledger-core: data model and pure building blocks for turning raw EVM
//! chain data into classified transactions.
//!
//! - [`account`]: chain-qualified accounts with venue segments
//! - [`address_book`]: address categories, names and decimals
//! - [`amount`]: signed fixed-point decimal arithmetic
//! - [`transaction`]: transfer categories, transfers and transactions
//! - [`evm`] / [`chain_data`]: raw chain records and the persisted cache
//! - [`merge`]: chronological, uuid-keyed ledger merging
//! - [`store`]: injected load/save capability

pub mod account;
pub mod address_book;
pub mod amount;
pub mod chain_data;
pub mod error;
pub mod evm;
pub mod merge;
pub mod store;
pub mod transaction;

pub use account::{insert_venue, Account};
pub use address_book::{AddressBook, AddressBookJson, AddressCategory, AddressEntry};
pub use amount::Amount;
pub use chain_data::{AddressHistory, ChainDataJson};
pub use error::{AccountError, AddressBookError, AmountError, ClassifyError, StoreError};
pub use evm::{EvmMetadata, EvmTransaction, EvmTransactionLog, EvmTransfer};
pub use merge::{merge_transaction, merge_transactions, MergeOutcome};
pub use store::{MemoryStore, Store};
pub use transaction::{Transaction, Transfer, TransferCategory};
