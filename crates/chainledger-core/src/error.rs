//! Error types shared across the ChainLedger crates.

use thiserror::Error;

/// A string could not be interpreted as an EVM address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("Invalid address: {address}")]
    InvalidAddress { address: String },

    #[error("Empty account")]
    Empty,
}

/// A decimal amount string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("Invalid decimal amount '{value}': {reason}")]
    Invalid { value: String, reason: String },

    #[error("Amount overflow: {value}")]
    Overflow { value: String },
}

/// An address book entry was rejected during construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressBookError {
    #[error("Invalid address book entry for {address}: {reason}")]
    InvalidEntry { address: String, reason: String },

    #[error(transparent)]
    Account(#[from] AccountError),
}

/// A protocol parser could not classify (part of) a transaction.
///
/// These are always recovered by the pipeline: logged, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("{app}: can't find {what}")]
    MissingTransfer { app: String, what: String },

    #[error("{app}: failed to decode log {index}: {reason}")]
    Decode { app: String, index: u64, reason: String },

    #[error("{app}: invalid amount: {source}")]
    Amount {
        app: String,
        #[source]
        source: AmountError,
    },

    #[error("{0}")]
    Other(String),
}

/// Errors from the injected persistence capability.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Other(String),
}
