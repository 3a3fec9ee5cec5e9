//! Compound v1 money market and Compound v2 cTokens.

use chainledger_core::account::{insert_venue, Account};
use chainledger_core::amount::Amount;
use chainledger_core::error::ClassifyError;
use chainledger_core::evm::{EvmTransaction, EvmTransactionLog};
use chainledger_core::transaction::{Transaction, Transfer, TransferCategory};
use std::sync::OnceLock;

use crate::abi::{DecodedLog, EventSet};
use crate::app::{is_any_raw, App, AppAddress};
use crate::context::ParserContext;
use crate::matching::{find_asset_transfer, find_closest, ONE_PERCENT};

use super::{decode_failed, default_index, missing, position, warn_miss};

const NAME: &str = "Compound";
const V1_VENUE: &str = "Compound-v1";

pub const COMPOUND_V1: AppAddress = AppAddress::defi("Compound-v1", "0x3fda67f7583380e67ef93072294a7fac882fd7e7");
pub const MAXIMILLION: AppAddress = AppAddress::defi("Maximillion", "0xf859a1ad94bcf445a406b892ef0d3082f4174088");
pub const COMPTROLLER: AppAddress = AppAddress::defi("Comptroller", "0x3d9819210a31b4961b30ef54be2aed79b9c9cd3b");
pub const COMP: AppAddress = AppAddress::token("COMP", "0xc00e94cb662c3520282e6f5717214004a7f26888");

const CONTRACTS: &[AppAddress] = &[COMPOUND_V1, MAXIMILLION, COMPTROLLER, COMP];

pub const C_TOKENS: &[AppAddress] = &[
    AppAddress::token("cBAT", "0x6c8c6b02e7b2be14d4fa6022dfd6d75921d90e4e").decimals(8),
    AppAddress::token("cCOMP", "0x70e36f6bf80a52b3b46b3af8e106cc0ed743e8e4").decimals(8),
    AppAddress::token("cDAI", "0x5d3a536e4d6dbd6114cc1ead35777bab948e3643").decimals(8),
    AppAddress::token("cETH", "0x4ddc2d193948926d02f9b1fe9e1daa0718270ed5").decimals(8),
    AppAddress::token("cREP", "0x158079ee67fce2f58472a96584a73c7ab9ac95c1").decimals(8),
    AppAddress::token("cSAI", "0xf5dce57282a584d2746faf1593d3121fcac444dc").decimals(8),
    AppAddress::token("cUNI", "0x35a18000230da775cac24873d00ff85bccded550").decimals(8),
    AppAddress::token("cUSDC", "0x39aa39c021dfbae8fac545936693ac917d5e7563").decimals(8),
    AppAddress::token("cUSDT", "0xf650c3d88d12db855b8bf7d11be6c55a4e07dcc9").decimals(8),
    AppAddress::token("cWBTC", "0xc11b1268c1a384e55c48c2391d8d480264a3a7f4").decimals(8),
    AppAddress::token("cWBTCv2", "0xccf4429db6322d5c611ee964527d42e5d685dd6a").decimals(8),
    AppAddress::token("cZRX", "0xb3319f5d18bc0d84dd1b4825dcde5d5f7266d407").decimals(8),
];

pub const APP: App = App {
    name: NAME,
    addresses: &[CONTRACTS, C_TOKENS],
    insert: &[],
    modify: &[parse_v1, parse_comptroller, parse_c_tokens],
    swap_venue: false,
};

/// Underlying asset and its decimals for a cToken.
pub fn underlying(c_token: &str) -> (&'static str, u8) {
    match c_token {
        "cBAT" => ("BAT", 18),
        "cCOMP" => ("COMP", 18),
        "cDAI" => ("DAI", 18),
        "cETH" => ("ETH", 18),
        "cREP" => ("REP", 18),
        "cSAI" => ("SAI", 18),
        "cUNI" => ("UNI", 18),
        "cUSDC" => ("USDC", 6),
        "cUSDT" => ("USDT", 6),
        "cWBTC" | "cWBTCv2" => ("WBTC", 8),
        "cZRX" => ("ZRX", 18),
        _ => ("", 18),
    }
}

const V1_EVENTS: &[&str] = &[
    "event BorrowRepaid(address account, address asset, uint256 amount, uint256 startingBalance, uint256 newBalance)",
    "event BorrowTaken(address account, address asset, uint256 amount, uint256 startingBalance, uint256 borrowAmountWithFee, uint256 newBalance)",
    "event SupplyReceived(address account, address asset, uint256 amount, uint256 startingBalance, uint256 newBalance)",
    "event SupplyWithdrawn(address account, address asset, uint256 amount, uint256 startingBalance, uint256 newBalance)",
];

const COMPTROLLER_EVENTS: &[&str] = &["event MarketEntered(address cToken, address account)"];

const C_TOKEN_EVENTS: &[&str] = &[
    "event Borrow(address borrower, uint256 borrowAmount, uint256 accountBorrows, uint256 totalBorrows)",
    "event Mint(address minter, uint256 mintAmount, uint256 mintTokens)",
    "event Redeem(address redeemer, uint256 redeemAmount, uint256 redeemTokens)",
    "event RepayBorrow(address payer, address borrower, uint256 repayAmount, uint256 accountBorrows, uint256 totalBorrows)",
    "event Transfer(address indexed from, address indexed to, uint256 amount)",
];

fn v1_events() -> &'static EventSet {
    static SET: OnceLock<EventSet> = OnceLock::new();
    SET.get_or_init(|| EventSet::parse_lossy(V1_EVENTS))
}

fn comptroller_events() -> &'static EventSet {
    static SET: OnceLock<EventSet> = OnceLock::new();
    SET.get_or_init(|| EventSet::parse_lossy(COMPTROLLER_EVENTS))
}

fn c_token_events() -> &'static EventSet {
    static SET: OnceLock<EventSet> = OnceLock::new();
    SET.get_or_init(|| EventSet::parse_lossy(C_TOKEN_EVENTS))
}

fn units(event: &DecodedLog, log: &EvmTransactionLog, name: &str, decimals: u8) -> Result<Amount, ClassifyError> {
    event
        .uint(name)
        .map(|raw| Amount::from_units(raw, decimals))
        .map_err(|e| decode_failed(NAME, log, e))
}

fn address_arg(event: &DecodedLog, log: &EvmTransactionLog, name: &str) -> Result<String, ClassifyError> {
    event.address(name).map_err(|e| decode_failed(NAME, log, e))
}

/// Mark a Maximillion refund of `asset` to Self.
fn mark_refund(tx: &mut Transaction, ctx: &ParserContext<'_>, asset: &str, venue: Option<&str>, index: f64) {
    let refund = position(tx, |t| t.asset == asset && ctx.is_self(&t.to) && MAXIMILLION.is(&t.from));
    if let Some(i) = refund {
        let t = &mut tx.transfers[i];
        t.category = TransferCategory::Refund;
        if let Some(venue) = venue {
            t.from = insert_venue(&t.to, venue);
        }
        default_index(t, index);
    }
}

// ─── Compound v1 ─────────────────────────────────────────────────────────────

fn parse_v1(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &mut ParserContext<'_>,
) -> Result<(), ClassifyError> {
    for log in evm_tx.logs.iter().filter(|l| COMPOUND_V1.is_raw(&l.address)) {
        tx.push_app(NAME);
        let Some(event) = v1_events().decode(log) else {
            continue;
        };
        tracing::info!(event = %event.name, "compound v1");
        warn_miss(evm_tx, v1_event(tx, log, &event, ctx));
    }
    Ok(())
}

fn v1_event(
    tx: &mut Transaction,
    log: &EvmTransactionLog,
    event: &DecodedLog,
    ctx: &ParserContext<'_>,
) -> Result<(), ClassifyError> {
    let market = ctx.account(&log.address);
    let token = address_arg(event, log, "asset")?;
    let asset = ctx.name(&token);
    let decimals = ctx.decimals(&token);
    let amount = units(event, log, "amount", decimals)?;
    let account = insert_venue(&ctx.account(&address_arg(event, log, "account")?), V1_VENUE);

    match event.name.as_str() {
        "SupplyReceived" => {
            let old_bal = units(event, log, "startingBalance", decimals)?;
            let new_bal = units(event, log, "newBalance", decimals)?;
            let i = find_asset_transfer(&tx.transfers, &asset, &amount, ONE_PERCENT, &[])
                .ok_or_else(|| missing(NAME, format!("deposit of {amount} {asset}")))?;
            let interest = new_bal - old_bal - tx.transfers[i].amount;
            let deposit = &mut tx.transfers[i];
            deposit.category = TransferCategory::Deposit;
            deposit.to = account.clone();
            let index = deposit.index.map(|x| x - 1.0);
            push_interest(tx, &asset, market, account, interest, index);
            tx.set_method("Deposit");
        }
        "SupplyWithdrawn" => {
            let old_bal = units(event, log, "startingBalance", decimals)?;
            let new_bal = units(event, log, "newBalance", decimals)?;
            let i = find_closest(&tx.transfers, &amount, ONE_PERCENT, |t| t.asset == asset && ctx.is_self(&t.to))
                .ok_or_else(|| missing(NAME, format!("withdrawal of {amount} {asset}")))?;
            let interest = tx.transfers[i].amount - (old_bal - new_bal);
            let withdraw = &mut tx.transfers[i];
            withdraw.category = TransferCategory::Withdraw;
            withdraw.from = account.clone();
            let index = withdraw.index.map(|x| x - 1.0);
            push_interest(tx, &asset, market, account, interest, index);
            tx.set_method("Withdraw");
        }
        "BorrowTaken" => {
            let i = find_asset_transfer(&tx.transfers, &asset, &amount, ONE_PERCENT, &[])
                .ok_or_else(|| missing(NAME, format!("borrow of {amount} {asset}")))?;
            let borrow = &mut tx.transfers[i];
            borrow.category = TransferCategory::Borrow;
            borrow.from = account;
            tx.set_method("Borrow");
        }
        "BorrowRepaid" => {
            let i = find_asset_transfer(&tx.transfers, &asset, &amount, ONE_PERCENT, &[])
                .ok_or_else(|| missing(NAME, format!("repayment of {amount} {asset}")))?;
            let repay = &mut tx.transfers[i];
            repay.category = TransferCategory::Repay;
            repay.to = account;
            tx.set_method("Repayment");
            mark_refund(tx, ctx, &asset, None, log.index as f64);
        }
        _ => {}
    }
    Ok(())
}

fn push_interest(
    tx: &mut Transaction,
    asset: &str,
    market: Account,
    account: Account,
    interest: Amount,
    index: Option<f64>,
) {
    if interest.is_positive() {
        tracing::debug!(asset, interest = %interest, "accrued interest");
        let mut income = Transfer::new(asset, TransferCategory::Income, market, account, interest);
        income.index = index;
        tx.transfers.push(income);
    }
}

// ─── Compound v2 ─────────────────────────────────────────────────────────────

fn parse_comptroller(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &mut ParserContext<'_>,
) -> Result<(), ClassifyError> {
    for log in evm_tx.logs.iter().filter(|l| COMPTROLLER.is_raw(&l.address)) {
        if let Some(event) = comptroller_events().decode(log) {
            if let Ok(c_token) = event.address("cToken") {
                tx.push_app(NAME);
                tx.set_method(format!("{} Registration", ctx.name(&c_token)));
            }
        }
    }
    // COMP distributed by the comptroller
    for log in evm_tx.logs.iter().filter(|l| COMP.is_raw(&l.address)) {
        let Some(event) = c_token_events().decode(log) else {
            continue;
        };
        let (Ok(from), Ok(to)) = (event.address("from"), event.address("to")) else {
            continue;
        };
        if event.name != "Transfer" || !COMPTROLLER.is_raw(&from) || !ctx.is_self(&ctx.account(&to)) {
            continue;
        }
        tx.push_app(NAME);
        let result = units(&event, log, "amount", ctx.decimals(&log.address)).and_then(|amount| {
            let i = find_asset_transfer(&tx.transfers, COMP.name, &amount, ONE_PERCENT, &[])
                .ok_or_else(|| missing(NAME, format!("income of {amount} COMP")))?;
            let income = &mut tx.transfers[i];
            income.category = TransferCategory::Income;
            income.from = ctx.account(COMPTROLLER.address);
            Ok(())
        });
        warn_miss(evm_tx, result);
    }
    Ok(())
}

fn parse_c_tokens(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &mut ParserContext<'_>,
) -> Result<(), ClassifyError> {
    for log in evm_tx.logs.iter().filter(|l| is_any_raw(C_TOKENS, &l.address)) {
        let Some(event) = c_token_events().decode(log) else {
            continue;
        };
        tx.push_app(NAME);
        warn_miss(evm_tx, c_token_event(tx, log, &event, ctx));
    }
    Ok(())
}

/// Underlying out to the market and cTokens back in, or the reverse.
fn swap(
    tx: &mut Transaction,
    market: &Account,
    (out_asset, out): (&str, &Amount),
    (in_asset, inn): (&str, &Amount),
) -> Result<(), ClassifyError> {
    let o = find_asset_transfer(&tx.transfers, out_asset, out, ONE_PERCENT, &[])
        .ok_or_else(|| missing(NAME, format!("swap out of {out} {out_asset}")))?;
    let i = find_asset_transfer(&tx.transfers, in_asset, inn, ONE_PERCENT, &[])
        .ok_or_else(|| missing(NAME, format!("swap in of {inn} {in_asset}")))?;
    let t = &mut tx.transfers[o];
    t.category = TransferCategory::SwapOut;
    t.to = market.clone();
    let t = &mut tx.transfers[i];
    t.category = TransferCategory::SwapIn;
    t.from = market.clone();
    Ok(())
}

fn c_token_event(
    tx: &mut Transaction,
    log: &EvmTransactionLog,
    event: &DecodedLog,
    ctx: &ParserContext<'_>,
) -> Result<(), ClassifyError> {
    let market = ctx.account(&log.address);
    let c_asset = ctx.name(&log.address);
    let c_decimals = ctx.decimals(&log.address);
    let (asset, decimals) = underlying(&c_asset);
    let index = log.index as f64;

    match event.name.as_str() {
        "Mint" => {
            let token_amt = units(event, log, "mintAmount", decimals)?;
            let c_amt = units(event, log, "mintTokens", c_decimals)?;
            tracing::info!(asset = %c_asset, amount = %token_amt, "compound mint");
            swap(tx, &market, (asset, &token_amt), (c_asset.as_str(), &c_amt))?;
            tx.set_method("Deposit");
        }
        "Redeem" => {
            let token_amt = units(event, log, "redeemAmount", decimals)?;
            let c_amt = units(event, log, "redeemTokens", c_decimals)?;
            tracing::info!(asset = %c_asset, amount = %token_amt, "compound redeem");
            swap(tx, &market, (c_asset.as_str(), &c_amt), (asset, &token_amt))?;
            tx.set_method("Withdraw");
        }
        "Borrow" => {
            let amount = units(event, log, "borrowAmount", decimals)?;
            tracing::info!(asset = %c_asset, amount = %amount, "compound borrow");
            tx.set_method("Borrow");
            let i = find_asset_transfer(&tx.transfers, asset, &amount, ONE_PERCENT, &[])
                .ok_or_else(|| missing(NAME, format!("borrow of {amount} {asset}")))?;
            let borrow = &mut tx.transfers[i];
            borrow.category = TransferCategory::Borrow;
            borrow.from = insert_venue(&borrow.to, &c_asset);
            default_index(borrow, index);
        }
        "RepayBorrow" => {
            let amount = units(event, log, "repayAmount", decimals)?;
            tracing::info!(asset = %c_asset, amount = %amount, "compound repay");
            let i = find_asset_transfer(&tx.transfers, asset, &amount, ONE_PERCENT, &[])
                .ok_or_else(|| missing(NAME, format!("repayment of {amount} {asset}")))?;
            let repay = &mut tx.transfers[i];
            repay.category = TransferCategory::Repay;
            repay.to = insert_venue(&repay.from, &c_asset);
            default_index(repay, index);
            tx.set_method("Repayment");
            mark_refund(tx, ctx, asset, Some(&c_asset), index + 1.0);
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underlying_of_every_market_is_known() {
        for c_token in C_TOKENS {
            let (asset, _) = underlying(c_token.name);
            assert!(!asset.is_empty(), "{}", c_token.name);
        }
        assert_eq!(underlying("cUSDC"), ("USDC", 6));
        assert_eq!(underlying("cWBTCv2"), ("WBTC", 8));
    }
}
