//! Idle Finance yield markets and IDLE staking.

use chainledger_core::account::{insert_venue, Account};
use chainledger_core::amount::Amount;
use chainledger_core::error::ClassifyError;
use chainledger_core::evm::{EvmTransaction, EvmTransactionLog};
use chainledger_core::transaction::{Transaction, TransferCategory};
use std::sync::OnceLock;

use crate::abi::{DecodedLog, EventSet};
use crate::app::{is_any_raw, App, AppAddress};
use crate::context::ParserContext;
use crate::matching::{find_closest, ONE_PERCENT};

use super::{decode_failed, missing, position, warn_miss};

const NAME: &str = "Idle";

pub const IDLE: AppAddress = AppAddress::token("IDLE", "0x875773784Af8135eA0ef43b5a374AaD105c5D39e");
pub const STK_IDLE: AppAddress = AppAddress::defi("stkIDLE", "0xaAC13a116eA7016689993193FcE4BadC8038136f");

const GOVERNANCE: &[AppAddress] = &[IDLE, STK_IDLE];

pub const MARKETS: &[AppAddress] = &[
    AppAddress::token("idleDAIYield", "0x3fe7940616e5bc47b0775a0dccf6237893353bb4"),
    AppAddress::token("idleRAIYield", "0x5C960a3DCC01BE8a0f49c02A8ceBCAcf5D07fABe"),
    AppAddress::token("idleSUSDYield", "0xF52CDcD458bf455aeD77751743180eC4A595Fd3F"),
    AppAddress::token("idleTUSDYield", "0xc278041fDD8249FE4c1Aad1193876857EEa3D68c"),
    AppAddress::token("idleUSDCYield", "0x5274891bEC421B39D23760c04A6755eCB444797C"),
    AppAddress::token("idleUSDTYield", "0xF34842d05A1c888Ca02769A633DF37177415C2f8"),
    AppAddress::token("idleWBTCYield", "0x8C81121B15197fA0eEaEE1DC75533419DcfD3151"),
    AppAddress::token("idleWETHYield", "0xC8E6CA6E96a326dC448307A5fDE90a0b21fd7f80"),
    AppAddress::token("idleDAISafe", "0xa14ea0e11121e6e951e87c66afe460a00bcd6a16"),
    AppAddress::token("idleUSDCSafe", "0x3391bc034f2935eF0E1e41619445F998b2680D35"),
    AppAddress::token("idleUSDTSafe", "0x28fAc5334C9f7262b3A3Fe707e250E01053e07b5"),
];

pub const APP: App = App {
    name: NAME,
    addresses: &[GOVERNANCE, MARKETS],
    insert: &[],
    modify: &[parse_staking, parse_markets],
    swap_venue: false,
};

const STK_IDLE_EVENTS: &[&str] = &[
    "event Deposit(address indexed provider, uint256 value, uint256 indexed locktime, int128 type, uint256 ts)",
    "event Withdraw(address indexed provider, uint256 value, uint256 ts)",
];

fn stk_idle_events() -> &'static EventSet {
    static SET: OnceLock<EventSet> = OnceLock::new();
    SET.get_or_init(|| EventSet::parse_lossy(STK_IDLE_EVENTS))
}

/// Underlying asset of an Idle market token.
pub fn underlying(market: &str) -> Option<&'static str> {
    Some(match market {
        "idleDAIYield" | "idleDAISafe" => "DAI",
        "idleRAIYield" => "RAI",
        "idleSUSDYield" => "sUSD",
        "idleTUSDYield" => "TUSD",
        "idleUSDCYield" | "idleUSDCSafe" => "USDC",
        "idleUSDTYield" | "idleUSDTSafe" => "USDT",
        "idleWBTCYield" => "WBTC",
        "idleWETHYield" => "WETH",
        _ => return None,
    })
}

// ─── Staking ─────────────────────────────────────────────────────────────────

fn parse_staking(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &mut ParserContext<'_>,
) -> Result<(), ClassifyError> {
    for log in evm_tx.logs.iter().filter(|l| STK_IDLE.is_raw(&l.address)) {
        tx.push_app(NAME);
        let Some(event) = stk_idle_events().decode(log) else {
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
    let provider = event.address("provider").map_err(|e| decode_failed(NAME, log, e))?;
    let venue = insert_venue(&ctx.account(&provider), STK_IDLE.name);
    let value = event
        .uint("value")
        .map(|raw| Amount::from_units(raw, ctx.decimals(IDLE.address)))
        .map_err(|e| decode_failed(NAME, log, e))?;
    tracing::info!(event = %event.name, %value, "stkIDLE");

    match event.name.as_str() {
        "Deposit" => {
            let i = find_closest(&tx.transfers, &value, ONE_PERCENT, |t| {
                t.asset == IDLE.name && ctx.is_self(&t.from)
            })
            .ok_or_else(|| missing(NAME, format!("outgoing transfer of {value} IDLE")))?;
            tx.transfers[i].category = TransferCategory::Internal;
            tx.transfers[i].to = venue;
            tx.set_method("Stake");
        }
        "Withdraw" => {
            let i = find_closest(&tx.transfers, &value, ONE_PERCENT, |t| {
                t.asset == IDLE.name && ctx.is_self(&t.to)
            })
            .ok_or_else(|| missing(NAME, format!("incoming transfer of {value} IDLE")))?;
            tx.transfers[i].category = TransferCategory::Internal;
            tx.transfers[i].from = venue;
            tx.set_method("Unstake");
        }
        _ => {}
    }
    Ok(())
}

// ─── Markets ─────────────────────────────────────────────────────────────────

fn parse_markets(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &mut ParserContext<'_>,
) -> Result<(), ClassifyError> {
    let mut seen: Vec<&str> = Vec::new();
    for log in evm_tx.logs.iter().filter(|l| is_any_raw(MARKETS, &l.address)) {
        if seen.iter().any(|a| a.eq_ignore_ascii_case(&log.address)) {
            continue;
        }
        seen.push(&log.address);
        tx.push_app(NAME);
        warn_miss(evm_tx, market(tx, &log.address, ctx));
    }
    Ok(())
}

fn market(tx: &mut Transaction, address: &str, ctx: &mut ParserContext<'_>) -> Result<(), ClassifyError> {
    let market = ctx.account(address);
    let asset = ctx.name(address);
    let token = underlying(&asset).ok_or_else(|| missing(NAME, format!("underlying of {asset}")))?;
    tracing::info!(market = %asset, %token, "idle market interaction");

    let i = position(tx, |t| t.asset == token && (ctx.is_self(&t.from) || ctx.is_self(&t.to)))
        .ok_or_else(|| missing(NAME, format!("{token} transfer")))?;

    if ctx.is_self(&tx.transfers[i].to) {
        let owner = tx.transfers[i].to.base();
        match position(tx, |t| t.asset == asset && ctx.is_self(&t.from)) {
            Some(j) => tx.transfers[j].category = TransferCategory::SwapOut,
            None if ctx.session.idle_deposits.contains(&(owner, market.clone())) => {
                tracing::debug!(market = %asset, "redemption of an earlier deposit");
                tx.transfers[i].from = market;
            }
            None => return Err(missing(NAME, format!("outgoing {asset} transfer"))),
        }
        tx.transfers[i].category = TransferCategory::SwapIn;
        tx.set_method("Withdrawal");
    } else {
        let owner: Account = tx.transfers[i].from.base();
        let j = position(tx, |t| t.asset == asset && ctx.is_self(&t.to))
            .ok_or_else(|| missing(NAME, format!("incoming {asset} transfer")))?;
        tx.transfers[i].category = TransferCategory::SwapOut;
        tx.transfers[j].category = TransferCategory::SwapIn;
        ctx.session.idle_deposits.insert((owner, market));
        tx.set_method("Deposit");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_market_has_an_underlying() {
        for market in MARKETS {
            assert!(underlying(market.name).is_some(), "{}", market.name);
        }
        assert_eq!(underlying("stkIDLE"), None);
    }
}
