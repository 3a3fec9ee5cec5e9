//! Aave v2 lending pools and the AAVE safety module.
//!
//! Deposits and withdrawals swap the underlying for its interest-bearing
//! aToken. Borrowed funds come out of, and repayments go into, an `Aave`
//! venue under the borrower's account.

use chainledger_core::account::insert_venue;
use chainledger_core::amount::Amount;
use chainledger_core::error::ClassifyError;
use chainledger_core::evm::{EvmTransaction, EvmTransactionLog};
use chainledger_core::transaction::{Transaction, TransferCategory};
use std::sync::OnceLock;

use crate::abi::{DecodedLog, EventSet};
use crate::app::{is_any_raw, App, AppAddress};
use crate::context::ParserContext;
use crate::matching::{find_asset_transfer, ONE_PERCENT};

use super::{decode_failed, missing, warn_miss};

const NAME: &str = "Aave";

pub const STK_AAVE: AppAddress = AppAddress::token("stkAAVE", "0x4da27a545c0c5B758a6BA100e3a049001de870f5");

pub const LENDING_POOLS: &[AppAddress] = &[
    AppAddress::defi("Aave-LendingPool", "0x7d2768de32b0b80b7a3454c06bdac94a69ddc7a9"),
    AppAddress::defi("Aave-LendingPool", "0x8dff5e27ea6b7ac08ebfdf9eb090f32ee9a30fcf").on("Polygon"),
];

const TOKENS: &[AppAddress] = &[
    AppAddress::token("AAVE", "0x7Fc66500c84A76Ad7e9c93437bFc5Ac33E2DDaE9"),
    STK_AAVE,
    AppAddress::token("aAAVE", "0xffc97d72e13e01096502cb8eb52dee56f74dad7b"),
    AppAddress::token("aBAT", "0x05ec93c0365baaeabf7aeffb0972ea7ecdd39cf1"),
    AppAddress::token("aDAI", "0x028171bca77440897b824ca71d1c56cac55b68a3"),
    AppAddress::token("aUSDC", "0xbcca60bb61934080951369a648fb03df4f96263c").decimals(6),
    AppAddress::token("aUSDT", "0x3Ed3B47Dd13EC9a98b44e6204A523E766B225811").decimals(6),
    AppAddress::token("aWBTC", "0x9ff58f4fFB29fA2266Ab25e75e2A8b3503311656").decimals(8),
    AppAddress::token("aETH", "0x030bA81f1c18d280636F32af80b9AAd02Cf0854e"),
    AppAddress::token("aYFI", "0x5165d24277cD063F5ac44Efd447B27025e888f37"),
    AppAddress::token("AAVE", "0xD6DF932A45C0f255f85145f286eA0b292B21C90B").on("Polygon"),
    AppAddress::token("amAAVE", "0x1d2a0E5EC8E5bBDCA5CB219e649B565d8e5c3360").on("Polygon"),
    AppAddress::token("amDAI", "0x27F8D03b3a2196956ED754baDc28D73be8830A6e").on("Polygon"),
    AppAddress::token("amUSDC", "0x1a13F4Ca1d028320A707D99520AbFefca3998b7F").decimals(6).on("Polygon"),
    AppAddress::token("amUSDT", "0x60D55F02A771d515e077c9C2403a1ef324885CeC").decimals(6).on("Polygon"),
    AppAddress::token("amETH", "0x28424507fefb6f7f8E9D3860F56504E4e5f5f390").on("Polygon"),
    AppAddress::token("amWBTC", "0x5c2ed810328349100A66B82b78a1791B101C9D61").decimals(8).on("Polygon"),
    AppAddress::token("amMATIC", "0x8dF3aad3a84da6b69A4DA8aeC3eA40d9091B2Ac4").on("Polygon"),
];

pub const APP: App = App {
    name: NAME,
    addresses: &[LENDING_POOLS, TOKENS],
    insert: &[],
    modify: &[parse_lending, parse_staking],
    swap_venue: false,
};

const LENDING_POOL_EVENTS: &[&str] = &[
    "event Deposit(address indexed reserve, address user, address indexed onBehalfOf, uint256 amount, uint16 indexed referral)",
    "event Withdraw(address indexed reserve, address indexed user, address indexed to, uint256 amount)",
    "event Borrow(address indexed reserve, address user, address indexed onBehalfOf, uint256 amount, uint256 borrowRateMode, uint256 borrowRate, uint16 indexed referral)",
    "event Repay(address indexed reserve, address indexed user, address indexed repayer, uint256 amount)",
];

const STAKE_EVENTS: &[&str] = &[
    "event Staked(address indexed from, address indexed onBehalfOf, uint256 amount)",
    "event Redeem(address indexed from, address indexed to, uint256 amount)",
];

fn lending_pool_events() -> &'static EventSet {
    static SET: OnceLock<EventSet> = OnceLock::new();
    SET.get_or_init(|| EventSet::parse_lossy(LENDING_POOL_EVENTS))
}

fn stake_events() -> &'static EventSet {
    static SET: OnceLock<EventSet> = OnceLock::new();
    SET.get_or_init(|| EventSet::parse_lossy(STAKE_EVENTS))
}

/// Interest-bearing token for an underlying: `a` (or `am` on Polygon) plus
/// the symbol without a leading `W`.
pub fn a_token_name(chain: &str, asset: &str) -> String {
    let prefix = if chain == "Polygon" { "am" } else { "a" };
    format!("{}{}", prefix, asset.strip_prefix('W').unwrap_or(asset))
}

fn same(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Rewrite the closest `asset_out`/`asset_in` pair as a swap through `venue`.
fn swap_pair(
    tx: &mut Transaction,
    log: &EvmTransactionLog,
    ctx: &ParserContext<'_>,
    asset_out: &str,
    asset_in: &str,
    amount: &Amount,
) -> Result<(), ClassifyError> {
    let venue = ctx.account(&log.address);
    let out = find_asset_transfer(&tx.transfers, asset_out, amount, ONE_PERCENT, &[])
        .ok_or_else(|| missing(NAME, format!("swap out of {amount} {asset_out}")))?;
    let inn = find_asset_transfer(&tx.transfers, asset_in, amount, ONE_PERCENT, &[])
        .ok_or_else(|| missing(NAME, format!("swap in of {amount} {asset_in}")))?;
    let t = &mut tx.transfers[out];
    t.category = TransferCategory::SwapOut;
    t.to = venue.clone();
    let t = &mut tx.transfers[inn];
    t.category = TransferCategory::SwapIn;
    t.from = venue;
    t.index = Some(log.index as f64);
    Ok(())
}

// ─── Lending pool ────────────────────────────────────────────────────────────

fn parse_lending(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &mut ParserContext<'_>,
) -> Result<(), ClassifyError> {
    for log in evm_tx.logs.iter().filter(|l| is_any_raw(LENDING_POOLS, &l.address)) {
        tx.push_app(NAME);
        let Some(event) = lending_pool_events().decode(log) else {
            continue;
        };
        warn_miss(evm_tx, lending_event(tx, log, &event, ctx));
    }
    Ok(())
}

fn lending_event(
    tx: &mut Transaction,
    log: &EvmTransactionLog,
    event: &DecodedLog,
    ctx: &ParserContext<'_>,
) -> Result<(), ClassifyError> {
    let arg = |name: &str| event.address(name).map_err(|e| decode_failed(NAME, log, e));
    let reserve = arg("reserve")?;
    let asset = ctx.name(&reserve);
    let amount = event
        .uint("amount")
        .map(|raw| Amount::from_units(raw, ctx.decimals(&reserve)))
        .map_err(|e| decode_failed(NAME, log, e))?;
    let a_asset = a_token_name(&ctx.meta.name, &asset);
    let is_self = |address: &str| ctx.is_self(&ctx.account(address));

    match event.name.as_str() {
        "Deposit" if is_self(&arg("user")?) || is_self(&arg("onBehalfOf")?) => {
            tracing::info!(asset = %asset, amount = %amount, "aave deposit");
            tx.set_method("Deposit");
            swap_pair(tx, log, ctx, &asset, &a_asset, &amount)?;
        }
        "Withdraw" if same(&arg("user")?, &arg("to")?) => {
            tracing::info!(asset = %asset, amount = %amount, "aave withdraw");
            tx.set_method("Withdraw");
            swap_pair(tx, log, ctx, &a_asset, &asset, &amount)?;
        }
        "Borrow" if same(&arg("user")?, &arg("onBehalfOf")?) => {
            tracing::info!(asset = %asset, amount = %amount, "aave borrow");
            tx.set_method("Borrow");
            let i = find_asset_transfer(&tx.transfers, &asset, &amount, ONE_PERCENT, &[])
                .ok_or_else(|| missing(NAME, format!("borrow of {amount} {asset}")))?;
            let t = &mut tx.transfers[i];
            t.category = TransferCategory::Borrow;
            t.from = insert_venue(&t.to, NAME);
        }
        "Repay" if same(&arg("user")?, &arg("repayer")?) => {
            tracing::info!(asset = %asset, amount = %amount, "aave repay");
            tx.set_method("Repay");
            let i = find_asset_transfer(&tx.transfers, &asset, &amount, ONE_PERCENT, &[])
                .ok_or_else(|| missing(NAME, format!("repayment of {amount} {asset}")))?;
            let t = &mut tx.transfers[i];
            t.category = TransferCategory::Repay;
            t.to = insert_venue(&t.from, NAME);
        }
        other => tracing::debug!(event = other, "skipping aave event"),
    }
    Ok(())
}

// ─── Safety module ───────────────────────────────────────────────────────────

fn parse_staking(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &mut ParserContext<'_>,
) -> Result<(), ClassifyError> {
    for log in evm_tx.logs.iter().filter(|l| STK_AAVE.is_raw(&l.address)) {
        tx.push_app(NAME);
        let Some(event) = stake_events().decode(log) else {
            continue;
        };
        warn_miss(evm_tx, stake_event(tx, log, &event, ctx));
    }
    Ok(())
}

fn stake_event(
    tx: &mut Transaction,
    log: &EvmTransactionLog,
    event: &DecodedLog,
    ctx: &ParserContext<'_>,
) -> Result<(), ClassifyError> {
    let amount = event
        .uint("amount")
        .map(|raw| Amount::from_units(raw, ctx.decimals(&log.address)))
        .map_err(|e| decode_failed(NAME, log, e))?;
    let arg = |name: &str| event.address(name).map_err(|e| decode_failed(NAME, log, e));
    match event.name.as_str() {
        "Staked" if same(&arg("from")?, &arg("onBehalfOf")?) => {
            swap_pair(tx, log, ctx, "AAVE", STK_AAVE.name, &amount)?;
            tx.set_method("Deposit");
        }
        "Redeem" if same(&arg("from")?, &arg("to")?) => {
            swap_pair(tx, log, ctx, STK_AAVE.name, "AAVE", &amount)?;
            tx.set_method("Withdraw");
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_token_names() {
        assert_eq!(a_token_name("Ethereum", "DAI"), "aDAI");
        assert_eq!(a_token_name("Ethereum", "WETH"), "aETH");
        assert_eq!(a_token_name("Polygon", "USDC"), "amUSDC");
    }
}
