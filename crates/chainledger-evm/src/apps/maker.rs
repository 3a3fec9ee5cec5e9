//! Maker: single- and multi-collateral DAI, the DSR and OasisDex.
//!
//! The Vat and Pot emit anonymous DSNote logs instead of events, so their
//! calls are recovered from the selector in topic 0 and the raw calldata
//! words. Amounts in those notes are internal accounting units and only
//! approximate the token transfer, hence the 10% matching tolerance.

use chainledger_core::account::insert_venue;
use chainledger_core::amount::Amount;
use chainledger_core::error::ClassifyError;
use chainledger_core::evm::{EvmTransaction, EvmTransactionLog};
use chainledger_core::transaction::{Transaction, TransferCategory};
use std::sync::OnceLock;

use crate::abi::{DecodedLog, EventSet, LogNote, LogNoteSet};
use crate::app::{App, AppAddress};
use crate::context::ParserContext;
use crate::matching::{assets_match, find_closest, ETHISH, ONE_PERCENT, TEN_PERCENT};
use crate::normalizer::bytes32_to_string;

use super::{called, decode_failed, default_index, is_one_of, logs_from, missing, position, warn_miss};

const NAME: &str = "Maker";
const DSR_VENUE: &str = "Maker-DSR";

pub const VAT: AppAddress = AppAddress::defi("mcd-vat", "0x35d1b3f3d7966a1dfe207aa4514c12a259a0492b");
pub const POT: AppAddress = AppAddress::defi("DSR", "0x197e90f9fad81970ba7976f33cbd77088e5d7cf7");
pub const MIGRATION: AppAddress = AppAddress::defi("mcd-migration", "0xc73e0383f3aff3215e6f04b0331d58cecf0ab849");
pub const TUB: AppAddress = AppAddress::defi("scd-tub", "0x448a5065aebb8e423f0896e6c5d525c040f59af3");

const CORE: &[AppAddress] = &[
    AppAddress::defi("scd-cage", "0x9fdc15106da755f9ffd5b0ba9854cfb89602e0fd"),
    AppAddress::defi("scd-gen-pit", "0x69076e44a9c70a67d5b79d95795aba299083c275"),
    AppAddress::defi("scd-tap", "0xbda109309f9fafa6dd6a9cb9f1df4085b27ee8ef"),
    TUB,
    AppAddress::defi("scd-vox", "0x9b0f70df76165442ca6092939132bbaea77f2d7a"),
    AppAddress::defi("mcd-dai-join", "0x9759a6ac90977b93b58547b4a71c78317f391a28"),
    AppAddress::defi("mcd-gem-join", "0x2f0b23f53734252bda2277357e97e1517d6b042a"),
    MIGRATION,
    POT,
    AppAddress::defi("mcd-sai-join", "0xad37fd42185ba63009177058208dd1be4b136e6b"),
    VAT,
    AppAddress::defi("mcd-manager", "0x5ef30b9986345249bc32d8928b7ee64de9435e39"),
];

pub const EXCHANGES: &[AppAddress] = &[
    AppAddress::exchange("oasis-v1", "0x14fbca95be7e99c15cc2996c6c9d841e54b79425"),
    AppAddress::exchange("oasis-v2", "0xb7ac09c2c0217b07d7c103029b4918a2c401eecb"),
    AppAddress::exchange("eth2dai", "0x39755357759ce0d7f32dc8dc45414cca409ae24e"),
    AppAddress::exchange("OasisDex", "0x794e6e91555438afc3ccf1c5076a74f42133d08d"),
];

pub const SAI: AppAddress = AppAddress::token("SAI", "0x89d24a6b4ccb1b6faa2625fe562bdd9a23260359");
pub const PETH: AppAddress = AppAddress::token("PETH", "0xf53ad2c6851052a81b42133467480961b2321c09");

const TOKENS: &[AppAddress] = &[
    SAI,
    PETH,
    AppAddress::token("MKR", "0x9f8f72aa9304c8b593d555f12ef6589cc3a579a2"),
];

pub const APP: App = App {
    name: NAME,
    addresses: &[CORE, EXCHANGES, TOKENS],
    insert: &[],
    modify: &[parse_dai, parse_oasis],
    swap_venue: false,
};

const VAT_FUNCTIONS: &[&str] = &[
    "slip(bytes32,address,int256)",
    "frob(bytes32,address,address,address,int256,int256)",
    "flux(bytes32,address,address,uint256)",
    "move(address,address,uint256)",
];

const POT_FUNCTIONS: &[&str] = &["join(uint256)", "exit(uint256)"];

const OASIS_EVENTS: &[&str] = &[
    "event LogTake(bytes32 id, bytes32 indexed pair, address indexed maker, address pay_gem, address buy_gem, address indexed taker, uint128 pay_amt, uint128 buy_amt, uint64 timestamp)",
];

fn vat_functions() -> &'static LogNoteSet {
    static SET: OnceLock<LogNoteSet> = OnceLock::new();
    SET.get_or_init(|| LogNoteSet::new(VAT_FUNCTIONS))
}

fn pot_functions() -> &'static LogNoteSet {
    static SET: OnceLock<LogNoteSet> = OnceLock::new();
    SET.get_or_init(|| LogNoteSet::new(POT_FUNCTIONS))
}

fn oasis_events() -> &'static EventSet {
    static SET: OnceLock<EventSet> = OnceLock::new();
    SET.get_or_init(|| EventSet::parse_lossy(OASIS_EVENTS))
}

/// `Maker-Vault-ETH-A` style venue for a collateral type.
pub fn vault_venue(ilk: &[u8; 32]) -> String {
    format!("{NAME}-Vault-{}", bytes32_to_string(ilk))
}

// ─── DAI ─────────────────────────────────────────────────────────────────────

fn parse_dai(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &mut ParserContext<'_>,
) -> Result<(), ClassifyError> {
    if called(evm_tx, MIGRATION.address) {
        tx.push_app(NAME);
        migrate(tx, ctx);
        return Ok(());
    }

    for log in &evm_tx.logs {
        if VAT.is_raw(&log.address) {
            let Some(note) = vat_functions().parse(log) else {
                continue;
            };
            tx.push_app(NAME);
            tracing::debug!(call = %note.name, "vat");
            let result = match note.name.as_str() {
                "slip" => slip(tx, evm_tx, log, &note, ctx),
                "frob" => frob(tx, &note),
                _ => Ok(()),
            };
            warn_miss(evm_tx, result);
        } else if POT.is_raw(&log.address) {
            let Some(note) = pot_functions().parse(log) else {
                continue;
            };
            tx.push_app(NAME);
            tracing::debug!(call = %note.name, "pot");
            warn_miss(evm_tx, dsr(tx, &note));
        }
    }
    Ok(())
}

fn migrate(tx: &mut Transaction, ctx: &ParserContext<'_>) {
    let migration = ctx.account(MIGRATION.address);
    match position(tx, |t| t.asset == SAI.name) {
        Some(i) => {
            tx.transfers[i].category = TransferCategory::SwapOut;
            tx.transfers[i].to = migration.clone();
        }
        None => tracing::warn!("no SAI transfer found for migration"),
    }
    match position(tx, |t| t.asset == "DAI") {
        Some(i) => {
            tx.transfers[i].category = TransferCategory::SwapIn;
            tx.transfers[i].from = migration;
        }
        None => tracing::warn!("no DAI transfer found for migration"),
    }
    tx.set_method("Migrate SAI to DAI");
}

fn is_expense_or_income(category: TransferCategory) -> bool {
    is_one_of(category, &[TransferCategory::Expense, TransferCategory::Income])
}

/// Collateral moved into or out of a vault. The ilk doesn't name the token,
/// so the collateral asset is taken from the join's transfer log right
/// after the note.
fn slip(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    log: &EvmTransactionLog,
    note: &LogNote,
    ctx: &ParserContext<'_>,
) -> Result<(), ClassifyError> {
    let vault = vault_venue(&note.arg(0));
    let token = evm_tx
        .logs
        .iter()
        .find(|l| l.index == log.index + 1)
        .map(|l| l.address.clone())
        .ok_or_else(|| missing(NAME, format!("collateral token for {vault}")))?;
    let asset = ctx.name(&token);
    let (negative, raw) = note.int(2);
    let wad = Amount::from_units(raw, ctx.decimals(&token));
    tracing::info!(%vault, %asset, wad = %wad, negative, "vault collateral change");

    let i = find_closest(&tx.transfers, &wad, TEN_PERCENT, |t| {
        is_expense_or_income(t.category) && assets_match(&t.asset, &asset, ETHISH)
    })
    .ok_or_else(|| missing(NAME, format!("{asset} transfer of about {wad}")))?;

    let transfer = &mut tx.transfers[i];
    transfer.category = TransferCategory::Internal;
    if negative {
        transfer.from = insert_venue(&transfer.to, &vault);
    } else {
        transfer.to = insert_venue(&transfer.from, &vault);
    }
    default_index(transfer, log.index as f64);
    tx.set_method(if negative { "Withdraw" } else { "Deposit" });
    Ok(())
}

/// Change in a vault's debt. `dart` is the sixth argument.
fn frob(tx: &mut Transaction, note: &LogNote) -> Result<(), ClassifyError> {
    let vault = vault_venue(&note.arg(0));
    let (negative, raw) = note.int(5);
    let dart = Amount::from_units(raw, 18);
    if dart.is_zero() {
        tracing::debug!(%vault, "no change in debt");
        return Ok(());
    }
    tracing::info!(%vault, dart = %dart, negative, "vault debt change");

    let i = find_closest(&tx.transfers, &dart, TEN_PERCENT, |t| {
        is_expense_or_income(t.category) && t.asset == "DAI"
    })
    .ok_or_else(|| missing(NAME, format!("DAI transfer of about {dart}")))?;

    let transfer = &mut tx.transfers[i];
    if negative {
        transfer.category = TransferCategory::Repay;
        transfer.to = insert_venue(&transfer.from, &vault);
        tx.set_method("Repayment");
    } else {
        transfer.category = TransferCategory::Borrow;
        transfer.from = insert_venue(&transfer.to, &vault);
        tx.set_method("Borrow");
    }
    Ok(())
}

fn dsr(tx: &mut Transaction, note: &LogNote) -> Result<(), ClassifyError> {
    let wad = Amount::from_units(note.uint(0), 18);
    match note.name.as_str() {
        "join" => {
            let i = find_closest(&tx.transfers, &wad, TEN_PERCENT, |t| {
                t.asset == "DAI" && t.category == TransferCategory::Expense
            })
            .ok_or_else(|| missing(NAME, format!("DAI expense of about {wad}")))?;
            let deposit = &mut tx.transfers[i];
            deposit.category = TransferCategory::Internal;
            deposit.to = insert_venue(&deposit.from, DSR_VENUE);
            tx.set_method("Deposit");
        }
        "exit" => {
            let i = find_closest(&tx.transfers, &wad, TEN_PERCENT, |t| {
                t.asset == "DAI" && t.category == TransferCategory::Income
            })
            .ok_or_else(|| missing(NAME, format!("DAI income of about {wad}")))?;
            let withdraw = &mut tx.transfers[i];
            withdraw.category = TransferCategory::Internal;
            withdraw.from = insert_venue(&withdraw.to, DSR_VENUE);
            tx.set_method("Withdraw");
        }
        _ => {}
    }
    Ok(())
}

// ─── OasisDex ────────────────────────────────────────────────────────────────

fn parse_oasis(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &mut ParserContext<'_>,
) -> Result<(), ClassifyError> {
    for log in logs_from(evm_tx, EXCHANGES) {
        tx.push_app(NAME);
        let Some(event) = oasis_events().decode(log) else {
            continue;
        };
        warn_miss(evm_tx, take(tx, log, &event, ctx));
    }
    Ok(())
}

fn take(
    tx: &mut Transaction,
    log: &EvmTransactionLog,
    event: &DecodedLog,
    ctx: &ParserContext<'_>,
) -> Result<(), ClassifyError> {
    let arg = |name: &str| event.address(name).map_err(|e| decode_failed(NAME, log, e));
    let (maker, taker) = (ctx.account(&arg("maker")?), ctx.account(&arg("taker")?));
    let (pay_gem, buy_gem) = (arg("pay_gem")?, arg("buy_gem")?);
    let amount = |name: &str, gem: &str| {
        event
            .uint(name)
            .map(|raw| Amount::from_units(raw, ctx.decimals(gem)))
            .map_err(|e| decode_failed(NAME, log, e))
    };
    let pay = amount("pay_amt", &pay_gem)?;
    let buy = amount("buy_amt", &buy_gem)?;

    // the maker gives pay_gem and receives buy_gem
    let ((in_gem, in_amt), (out_gem, out_amt)) = if ctx.is_self(&maker) {
        ((buy_gem, buy), (pay_gem, pay))
    } else if ctx.is_self(&taker) {
        ((pay_gem, pay), (buy_gem, buy))
    } else {
        tracing::debug!(%maker, %taker, "skipping trade between others");
        return Ok(());
    };
    let (in_asset, out_asset) = (ctx.name(&in_gem), ctx.name(&out_gem));
    tracing::info!(out = %out_amt, %out_asset, inn = %in_amt, %in_asset, "oasis trade");

    let exchange = ctx.account(&log.address);
    let swap_in = find_closest(&tx.transfers, &in_amt, ONE_PERCENT, |t| {
        t.asset == in_asset && ctx.is_self(&t.to) && !ctx.is_self(&t.from)
    })
    .ok_or_else(|| missing(NAME, format!("swap in of {in_amt} {in_asset}")))?;
    tx.transfers[swap_in].category = TransferCategory::SwapIn;
    tx.transfers[swap_in].from = exchange.clone();

    let swap_out = find_closest(&tx.transfers, &out_amt, ONE_PERCENT, |t| {
        t.asset == out_asset && ctx.is_self(&t.from) && !ctx.is_self(&t.to)
    })
    .ok_or_else(|| missing(NAME, format!("swap out of {out_amt} {out_asset}")))?;
    tx.transfers[swap_out].category = TransferCategory::SwapOut;
    tx.transfers[swap_out].to = exchange;
    tx.set_method("Trade");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_venue_decodes_ilk() {
        let mut ilk = [0u8; 32];
        ilk[..5].copy_from_slice(b"ETH-A");
        assert_eq!(vault_venue(&ilk), "Maker-Vault-ETH-A");
    }

    #[test]
    fn frob_note_exposes_signed_dart() {
        let selector = crate::fingerprint::selector(VAT_FUNCTIONS[1]);
        let mut words = vec![format!("{:064x}", 32), format!("{:064x}", 4 + 6 * 32)];
        let mut calldata = selector.trim_start_matches("0x").to_string();
        calldata.push_str(&hex::encode(b"ETH-A"));
        calldata.push_str(&"0".repeat(54));
        for _ in 0..4 {
            calldata.push_str(&"0".repeat(64));
        }
        // -1 DAI in two's complement
        calldata.push_str("fffffffffffffffffffffffffffffffffffffffffffffffff21f494c589c0000");
        calldata.push_str(&"0".repeat(56));
        words.push(calldata);
        let log = EvmTransactionLog {
            address: VAT.address.to_string(),
            data: format!("0x{}", words.concat()),
            index: 3,
            topics: vec![format!("{}{}", selector, "0".repeat(56))],
        };

        let note = vat_functions().parse(&log).expect("frob note");
        assert_eq!(note.name, "frob");
        assert_eq!(vault_venue(&note.arg(0)), "Maker-Vault-ETH-A");
        let (negative, raw) = note.int(5);
        assert!(negative);
        assert_eq!(Amount::from_units(raw, 18), Amount::from_int(1));
    }
}
