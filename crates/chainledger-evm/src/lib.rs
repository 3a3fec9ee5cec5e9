//! chainledger-evm: turns raw EVM transactions into classified transactions.
//!
//! - [`abi`] / [`normalizer`] / [`fingerprint`]: event ABI decoding on alloy
//! - [`decoder`]: the generic base transaction (fee, value, calls, tokens)
//! - [`category`]: the Self/Exchange category heuristic
//! - [`matching`]: closest-amount matching
//! - [`app`] / [`apps`]: protocol parsers grouped per app
//! - [`pipeline`]: insert parsers, modify parsers, proxy pass, finalisation
//! - [`registry`]: public addresses merged into every address book
//!
//! # Example
//!
//! ```rust,no_run
//! use chainledger_core::{AddressBookJson, EvmMetadata, EvmTransaction};
//! use chainledger_evm::{address_book, parse_transaction};
//!
//! # fn run(evm_tx: EvmTransaction) {
//! let book = address_book(AddressBookJson::new(), &[]);
//! let tx = parse_transaction(&evm_tx, &EvmMetadata::ethereum(), &book, &[]);
//! println!("{} {}", tx.method, tx.transfers.len());
//! # }
//! ```

pub mod abi;
pub mod app;
pub mod apps;
pub mod category;
pub mod context;
pub mod decoder;
pub mod error;
pub mod fingerprint;
pub mod matching;
pub mod normalizer;
pub mod pipeline;
pub mod registry;

pub use abi::{DecodedLog, EventAbi, EventSet, LogNote, LogNoteSet};
pub use normalizer::LogValue;
pub use app::{App, AppAddress, Parser};
pub use apps::BUILTIN_APPS;
pub use category::get_transfer_category;
pub use context::{ParserContext, SessionState};
pub use decoder::decode_transaction;
pub use error::DecodeError;
pub use pipeline::{finalize, parse_transaction, Pipeline};
pub use registry::{address_book, public_entries};
