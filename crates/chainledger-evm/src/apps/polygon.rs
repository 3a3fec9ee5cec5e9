//! Bridging from Ethereum to Polygon through the Plasma bridge, directly or
//! via the Zapper bridge.
//!
//! Bridged funds stay ours: the deposit becomes an `Internal` transfer to
//! the same address on Polygon.

use chainledger_core::account::Account;
use chainledger_core::amount::Amount;
use chainledger_core::error::ClassifyError;
use chainledger_core::evm::{EvmTransaction, EvmTransactionLog};
use chainledger_core::transaction::{Transaction, Transfer, TransferCategory};
use std::sync::OnceLock;

use crate::abi::{DecodedLog, EventSet};
use crate::app::{App, AppAddress};
use crate::context::ParserContext;

use super::{called, decode_failed, default_index, is_one_of, logs_from, missing, position, warn_miss};

const NAME: &str = "Polygon";
const DESTINATION: &str = "Polygon";

pub const PLASMA_BRIDGE: AppAddress = AppAddress::defi("PlasmaBridge", "0x401f6c983ea34274ec46f84d70b31c151321188b");
pub const ZAP_BRIDGE: AppAddress = AppAddress::defi("ZapperPolygonBridge", "0xe34b087bf3c99e664316a15b01e5295eb3512760");

const BRIDGES: &[AppAddress] = &[PLASMA_BRIDGE, ZAP_BRIDGE];

const MISC: &[AppAddress] = &[
    AppAddress::defi("FlashWallet", "0x22f9dcf4647084d6c31b2765f6910cd85c178c18"),
    AppAddress::defi("ZeroEx", "0xdef1c0ded9bec7f1a1670819833240f027b25eff"),
    AppAddress::defi("PolygonStateSyncer", "0x28e4f3a7f651294b9564800b2d01f35189a5bfbe"),
];

const TOKENS: &[AppAddress] = &[AppAddress::token("MATIC", "0x7d1afa7b718fb893db30a3abc0cfc608aacfebb0")];

pub const APP: App = App {
    name: NAME,
    addresses: &[BRIDGES, MISC, TOKENS],
    insert: &[insert_zap],
    modify: &[parse_bridge],
    swap_venue: false,
};

const PLASMA_EVENTS: &[&str] = &[
    "event NewDepositBlock(address indexed owner, address indexed token, uint256 amountOrNFTId, uint256 depositBlockId)",
];

fn plasma_events() -> &'static EventSet {
    static SET: OnceLock<EventSet> = OnceLock::new();
    SET.get_or_init(|| EventSet::parse_lossy(PLASMA_EVENTS))
}

/// One decoded `NewDepositBlock`.
struct Deposit {
    owner: Account,
    asset: String,
    amount: Amount,
}

fn deposit(log: &EvmTransactionLog, event: &DecodedLog, ctx: &ParserContext<'_>) -> Result<Deposit, ClassifyError> {
    let owner = event.address("owner").map_err(|e| decode_failed(NAME, log, e))?;
    let token = event.address("token").map_err(|e| decode_failed(NAME, log, e))?;
    let raw = event.uint("amountOrNFTId").map_err(|e| decode_failed(NAME, log, e))?;
    Ok(Deposit {
        owner: ctx.account(&owner),
        asset: ctx.name(&token),
        amount: Amount::from_units(raw, ctx.decimals(&token)),
    })
}

/// The bridge wraps native deposits, so `ETH` sent in arrives as `WETH`.
fn bridged_as(asset: &str, bridged: &str, ctx: &ParserContext<'_>) -> bool {
    asset == bridged || (asset == ctx.meta.fee_asset && bridged.strip_prefix('W') == Some(asset))
}

fn destination(owner: &Account) -> Account {
    Account::on_chain(DESTINATION, &owner.address)
}

// ─── Zapper ──────────────────────────────────────────────────────────────────

/// The Zapper bridge trades our funds inside its own flash wallet and
/// deposits the proceeds for us, so the bridged token never passes through
/// our address. Add the swap-in of the bridged token and its deposit.
fn insert_zap(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &mut ParserContext<'_>,
) -> Result<(), ClassifyError> {
    if !called(evm_tx, ZAP_BRIDGE.address) {
        return Ok(());
    }
    let zapper = ctx.account(ZAP_BRIDGE.address);
    for log in logs_from(evm_tx, BRIDGES) {
        let Some(event) = plasma_events().decode(log) else {
            continue;
        };
        let deposit = deposit(log, &event, ctx)?;
        if !ctx.is_self(&deposit.owner) {
            continue;
        }
        tracing::info!(asset = %deposit.asset, amount = %deposit.amount, "zap to polygon");
        let index = log.index as f64;
        tx.transfers.push(
            Transfer::new(
                &deposit.asset,
                TransferCategory::SwapIn,
                zapper.clone(),
                deposit.owner.clone(),
                deposit.amount,
            )
            .with_index(index - 0.5),
        );
        tx.transfers.push(
            Transfer::new(
                &deposit.asset,
                TransferCategory::Internal,
                deposit.owner.clone(),
                destination(&deposit.owner),
                deposit.amount,
            )
            .with_index(index),
        );
    }
    Ok(())
}

// ─── Plasma bridge ───────────────────────────────────────────────────────────

fn parse_bridge(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &mut ParserContext<'_>,
) -> Result<(), ClassifyError> {
    if called(evm_tx, ZAP_BRIDGE.address) {
        tx.push_app(NAME);
        tx.set_method("Zap to Polygon");
        let zapper = ctx.account(ZAP_BRIDGE.address);
        for t in tx.transfers.iter_mut() {
            if ctx.is_self(&t.from) && t.to == zapper && t.category == TransferCategory::Expense {
                t.category = TransferCategory::SwapOut;
            }
        }
        return Ok(());
    }
    for log in logs_from(evm_tx, BRIDGES) {
        tx.push_app(NAME);
        let Some(event) = plasma_events().decode(log) else {
            continue;
        };
        warn_miss(evm_tx, plasma_deposit(tx, log, &event, ctx));
    }
    Ok(())
}

fn plasma_deposit(
    tx: &mut Transaction,
    log: &EvmTransactionLog,
    event: &DecodedLog,
    ctx: &ParserContext<'_>,
) -> Result<(), ClassifyError> {
    let deposit = deposit(log, event, ctx)?;
    let i = position(tx, |t| {
        ctx.is_self(&t.from)
            && bridged_as(&t.asset, &deposit.asset, ctx)
            && t.amount == deposit.amount
            && is_one_of(t.category, &[TransferCategory::Expense, TransferCategory::Internal])
    })
    .ok_or_else(|| missing(NAME, format!("deposit of {} {}", deposit.amount, deposit.asset)))?;
    tracing::info!(asset = %deposit.asset, amount = %deposit.amount, "plasma bridge deposit");
    let t = &mut tx.transfers[i];
    t.category = TransferCategory::Internal;
    t.to = destination(&deposit.owner);
    default_index(t, log.index as f64);
    tx.set_method("Plasma Bridge to Polygon");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainledger_core::address_book::AddressBookJson;
    use chainledger_core::evm::EvmMetadata;

    use crate::context::SessionState;

    #[test]
    fn native_deposits_bridge_as_wrapped() {
        let book = crate::address_book(AddressBookJson::new(), &[]);
        let meta = EvmMetadata::ethereum();
        let mut session = SessionState::new();
        let ctx = ParserContext::new(&book, &meta, &mut session);
        assert!(bridged_as("ETH", "WETH", &ctx));
        assert!(bridged_as("DAI", "DAI", &ctx));
        assert!(!bridged_as("WBTC", "BTC", &ctx));
    }

    #[test]
    fn bridged_funds_land_on_polygon() {
        let owner = Account::on_chain("Ethereum", "0x1111111111111111111111111111111111111111");
        let there = destination(&owner);
        assert_eq!(there.chain.as_deref(), Some("Polygon"));
        assert!(there.is_address_of(&owner.address));
    }
}
