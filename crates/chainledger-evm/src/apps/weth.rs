//! Wrapped native assets (WETH, WMATIC).
//!
//! The decoder already emits the wrapped-token side of a `Deposit` or
//! `Withdrawal`. This app pairs it with the native transfer it consumed or
//! produced and turns the two into a swap.

use chainledger_core::amount::Amount;
use chainledger_core::error::ClassifyError;
use chainledger_core::evm::{EvmTransaction, EvmTransactionLog};
use chainledger_core::transaction::{Transaction, Transfer, TransferCategory};

use crate::app::{App, AppAddress};
use crate::context::ParserContext;
use crate::decoder::{is_wrapped_native, wrapped_native_events};

use super::{called, decode_failed, default_index, missing, position, warn_miss};

pub const WETH: AppAddress = AppAddress::token("WETH", "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
pub const WMATIC: AppAddress = AppAddress::token("WMATIC", "0x0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270").on("Polygon");

const ADDRESSES: &[AppAddress] = &[WETH, WMATIC];

pub const APP: App = App {
    name: "Weth",
    addresses: &[ADDRESSES],
    insert: &[],
    modify: &[parse_wrapping],
    swap_venue: false,
};

fn parse_wrapping(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &mut ParserContext<'_>,
) -> Result<(), ClassifyError> {
    for log in evm_tx.logs.iter().filter(|l| is_wrapped_native(&l.address, ctx)) {
        warn_miss(evm_tx, parse_log(tx, evm_tx, log, ctx));
    }
    Ok(())
}

fn parse_log(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    log: &EvmTransactionLog,
    ctx: &ParserContext<'_>,
) -> Result<(), ClassifyError> {
    let Some(event) = wrapped_native_events().decode(log) else {
        return Ok(());
    };
    let weth = ctx.account(&log.address);
    let asset = ctx.name(&log.address);
    let fee_asset = ctx.meta.fee_asset.clone();
    let index = log.index as f64;
    let amount = event
        .uint("wad")
        .map(|wad| Amount::from_units(wad, ctx.decimals(&log.address)))
        .map_err(|e| decode_failed(APP.name, log, e))?;
    let own = |t: &Transfer| t.asset == asset && t.index == Some(index);
    tx.push_app(&asset_app(&asset));

    match event.name.as_str() {
        "Deposit" => {
            tracing::info!(asset = %asset, amount = %amount, "wrap");
            if let Some(i) = position(tx, own) {
                let wrapped = &mut tx.transfers[i];
                wrapped.category = if ctx.is_self(&wrapped.to) { TransferCategory::SwapIn } else { TransferCategory::Noop };
            }
            let i = position(tx, |t| t.asset == fee_asset && t.amount == amount && t.to == weth)
                .ok_or_else(|| missing(APP.name, format!("{fee_asset} transfer for deposit of {amount} {asset}")))?;
            let sender = tx.transfers[i].from.clone();
            let swap_out = &mut tx.transfers[i];
            swap_out.category = if ctx.is_self(&sender) { TransferCategory::SwapOut } else { TransferCategory::Noop };
            default_index(swap_out, index - 1.0);
            if called(evm_tx, &log.address) {
                tx.set_method("Trade");
            }
            // A same-value hop into the sender goes right before the swap.
            if let Some(j) = position(tx, |t| t.asset == fee_asset && t.amount == amount && t.to == sender) {
                default_index(&mut tx.transfers[j], index - 1.0);
            }
        }
        "Withdrawal" => {
            tracing::info!(asset = %asset, amount = %amount, "unwrap");
            if let Some(i) = position(tx, own) {
                let wrapped = &mut tx.transfers[i];
                wrapped.category = if ctx.is_self(&wrapped.from) { TransferCategory::SwapOut } else { TransferCategory::Noop };
            }
            let i = position(tx, |t| t.asset == fee_asset && t.amount == amount && t.from == weth)
                .ok_or_else(|| missing(APP.name, format!("{fee_asset} transfer for withdrawal of {amount} {asset}")))?;
            let recipient = tx.transfers[i].to.clone();
            let swap_in = &mut tx.transfers[i];
            swap_in.category = if ctx.is_self(&recipient) { TransferCategory::SwapIn } else { TransferCategory::Noop };
            default_index(swap_in, index + 1.0);
            if called(evm_tx, &log.address) {
                tx.set_method("Trade");
            }
            if let Some(j) = position(tx, |t| t.asset == fee_asset && t.amount == amount && t.from == recipient) {
                default_index(&mut tx.transfers[j], index + 1.0);
            }
        }
        _ => {}
    }
    Ok(())
}

fn asset_app(asset: &str) -> String {
    match asset {
        "WMATIC" => "WMatic".to_string(),
        _ => APP.name.to_string(),
    }
}
