//! Built-in protocol apps, in pipeline order.
//!
//! Later apps win when two set the method of one transaction, so more
//! specific protocols are listed after generic ones. The DSProxy app runs
//! as the final pass in [`crate::pipeline`].

pub mod aave;
pub mod compound;
pub mod ens;
pub mod idle;
pub mod maker;
pub mod polygon;
pub mod proxy;
pub mod tokens;
pub mod tornado;
pub mod uniswap;
pub mod weth;
pub mod yearn;

use chainledger_core::account::Account;
use chainledger_core::error::ClassifyError;
use chainledger_core::evm::{EvmTransaction, EvmTransactionLog};
use chainledger_core::transaction::{Transaction, Transfer, TransferCategory};

use crate::app::{is_any_raw, App, AppAddress};
use crate::error::DecodeError;

/// Every built-in app except the proxy pass.
pub const BUILTIN_APPS: &[App] = &[
    tokens::APP,
    weth::APP,
    uniswap::APP,
    tornado::APP,
    aave::APP,
    compound::APP,
    maker::APP,
    idle::APP,
    yearn::APP,
    ens::APP,
    polygon::APP,
];

/// Logs emitted by any of `addresses`.
pub(crate) fn logs_from<'a>(
    evm_tx: &'a EvmTransaction,
    addresses: &'a [AppAddress],
) -> impl Iterator<Item = &'a EvmTransactionLog> + 'a {
    evm_tx.logs.iter().filter(move |log| is_any_raw(addresses, &log.address))
}

/// True if the transaction was sent directly to `address`.
pub(crate) fn called(evm_tx: &EvmTransaction, address: &str) -> bool {
    evm_tx
        .to
        .as_deref()
        .map(|to| to.eq_ignore_ascii_case(address))
        .unwrap_or(false)
}

pub(crate) fn missing(app: &str, what: impl Into<String>) -> ClassifyError {
    ClassifyError::MissingTransfer {
        app: app.to_string(),
        what: what.into(),
    }
}

pub(crate) fn decode_failed(app: &str, log: &EvmTransactionLog, e: DecodeError) -> ClassifyError {
    ClassifyError::Decode {
        app: app.to_string(),
        index: log.index,
        reason: e.to_string(),
    }
}

/// Log a classification miss for one event and carry on with the next.
pub(crate) fn warn_miss(evm_tx: &EvmTransaction, result: Result<(), ClassifyError>) {
    if let Err(e) = result {
        tracing::warn!(hash = %evm_tx.hash, error = %e, "classification miss");
    }
}

/// Position of the first transfer satisfying `pred`.
pub(crate) fn position<F>(tx: &Transaction, pred: F) -> Option<usize>
where
    F: Fn(&Transfer) -> bool,
{
    tx.transfers.iter().position(pred)
}

pub(crate) fn is_one_of(category: TransferCategory, options: &[TransferCategory]) -> bool {
    options.contains(&category)
}

/// Set an index on a transfer that doesn't have one yet.
pub(crate) fn default_index(transfer: &mut Transfer, index: f64) {
    if transfer.index.is_none() {
        transfer.index = Some(index);
    }
}

pub(crate) fn same_account(account: &Account, address: &str) -> bool {
    account.is_address_of(address) && !account.has_venue()
}
