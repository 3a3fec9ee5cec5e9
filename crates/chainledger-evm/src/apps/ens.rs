//! ENS registrars: the first-generation auction registrar, the ETH controllers and
//! the `.eth` name NFT.
//!
//! Registering through a controller pays ETH for the name NFT, so the
//! payment and the name form a swap and any overpayment comes back as a
//! refund. Bids on the auction registrar stay ours inside an `ENS` venue
//! until revealed or until the deed is closed.

use alloy_primitives::U256;
use chainledger_core::account::{insert_venue, Account};
use chainledger_core::address_book::AddressCategory;
use chainledger_core::amount::Amount;
use chainledger_core::error::ClassifyError;
use chainledger_core::evm::{EvmTransaction, EvmTransactionLog};
use chainledger_core::transaction::{Transaction, Transfer, TransferCategory};
use std::sync::OnceLock;

use crate::abi::{DecodedLog, EventSet};
use crate::app::{is_any_raw, App, AppAddress};
use crate::context::ParserContext;
use crate::fingerprint::keccak256_signature;

use super::{called, decode_failed, default_index, logs_from};

const NAME: &str = "ENS";

pub const NAME_NFT: AppAddress = AppAddress::new("ENS", "0x57f1887a8bf19b14fc0df6fd9b2acc9af147ea85", AddressCategory::Nft);

pub const AUCTION_REGISTRAR: AppAddress = AppAddress::defi("ENS-registrar-old", "0x6090a6e47849629b7245dfa1ca21d94cd15878ef");

pub const CONTROLLERS: &[AppAddress] = &[
    AppAddress::defi("ENS-registrar", "0xb22c1c159d12461ea124b0deb4b5b93020e6ad16"),
    AppAddress::defi("ENS-registrar", "0x283af0b28c62c092c9727f1ee09c02ca627eb7f5"),
];

const CORE: &[AppAddress] = &[
    AppAddress::defi("ENS-registry", "0x314159265dd8dbb310642f98f50c066173c1259b"),
    NAME_NFT,
    AUCTION_REGISTRAR,
];

pub const APP: App = App {
    name: NAME,
    addresses: &[CORE, CONTROLLERS],
    insert: &[insert_names],
    modify: &[parse_registrars],
    swap_venue: false,
};

const NFT_EVENTS: &[&str] = &[
    "event NameMigrated(uint256 indexed id, address indexed owner, uint256 expires)",
    "event NameRegistered(uint256 indexed id, address indexed owner, uint256 expires)",
    "event NameRenewed(uint256 indexed id, uint256 expires)",
];

const CONTROLLER_EVENTS: &[&str] = &[
    "event NameRegistered(string name, bytes32 indexed label, address indexed owner, uint256 cost, uint256 expires)",
    "event NameRenewed(string name, bytes32 indexed label, uint256 cost, uint256 expires)",
];

const AUCTION_EVENTS: &[&str] = &[
    "event AuctionStarted(bytes32 indexed hash, uint256 registrationDate)",
    "event BidRevealed(bytes32 indexed hash, address indexed owner, uint256 value, uint8 status)",
    "event HashInvalidated(bytes32 indexed hash, string indexed name, uint256 value, uint256 registrationDate)",
    "event HashRegistered(bytes32 indexed hash, address indexed owner, uint256 value, uint256 registrationDate)",
    "event HashReleased(bytes32 indexed hash, uint256 value)",
    "event NewBid(bytes32 indexed hash, address indexed bidder, uint256 deposit)",
];

const DEED_CLOSED: &str = "DeedClosed()";

fn nft_events() -> &'static EventSet {
    static SET: OnceLock<EventSet> = OnceLock::new();
    SET.get_or_init(|| EventSet::parse_lossy(NFT_EVENTS))
}

fn controller_events() -> &'static EventSet {
    static SET: OnceLock<EventSet> = OnceLock::new();
    SET.get_or_init(|| EventSet::parse_lossy(CONTROLLER_EVENTS))
}

fn auction_events() -> &'static EventSet {
    static SET: OnceLock<EventSet> = OnceLock::new();
    SET.get_or_init(|| EventSet::parse_lossy(AUCTION_EVENTS))
}

fn deed_closed_topic() -> &'static str {
    static TOPIC: OnceLock<String> = OnceLock::new();
    TOPIC.get_or_init(|| keccak256_signature(DEED_CLOSED))
}

/// Asset name of the `.eth` NFT for a label hash, as the token decoder
/// names ERC721 transfers.
pub fn name_asset(label: &[u8]) -> String {
    format!("{}_{}", NAME_NFT.name, U256::from_be_slice(label))
}

fn is_name_asset(asset: &str) -> bool {
    asset.starts_with(&format!("{}_", NAME_NFT.name))
}

// ─── Name NFT ────────────────────────────────────────────────────────────────

/// The controller often mints the name to itself and hands it over in a
/// call whose NFT transfer the explorer never reports. Add the incoming
/// name for self-owned registrations that carry no NFT transfer.
fn insert_names(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &mut ParserContext<'_>,
) -> Result<(), ClassifyError> {
    for log in logs_from(evm_tx, CONTROLLERS) {
        let Some(event) = controller_events().decode(log) else {
            continue;
        };
        if event.name != "NameRegistered" {
            continue;
        }
        let owner = event
            .address("owner")
            .map(|o| ctx.account(&o))
            .map_err(|e| decode_failed(NAME, log, e))?;
        if !ctx.is_self(&owner) {
            continue;
        }
        let asset = name_asset(event.bytes("label").map_err(|e| decode_failed(NAME, log, e))?);
        if tx.transfers.iter().any(|t| t.asset == asset && t.to == owner) {
            continue;
        }
        tracing::info!(name = event.string("name").unwrap_or_default(), asset = %asset, "adding registered ens name");
        tx.transfers.push(
            Transfer::new(
                asset,
                TransferCategory::SwapIn,
                ctx.account(NAME_NFT.address),
                owner,
                Amount::from_int(1),
            )
            .with_index(log.index as f64),
        );
    }
    Ok(())
}

// ─── Registrars ──────────────────────────────────────────────────────────────

fn parse_registrars(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &mut ParserContext<'_>,
) -> Result<(), ClassifyError> {
    let ours: Vec<&EvmTransactionLog> = evm_tx
        .logs
        .iter()
        .filter(|l| is_any_raw(CORE, &l.address) || is_any_raw(CONTROLLERS, &l.address))
        .collect();
    if ours.is_empty() {
        return Ok(());
    }
    tx.push_app(NAME);
    close_deeds(tx, evm_tx);

    for log in ours {
        if NAME_NFT.is_raw(&log.address) {
            if let Some(event) = nft_events().decode(log) {
                tracing::info!(event = %event.name, "ens name");
                match event.name.as_str() {
                    "NameMigrated" => tx.set_method("Migration"),
                    "NameRegistered" if tx.method.is_empty() => tx.set_method("Registration"),
                    "NameRenewed" => tx.set_method("Renewal"),
                    _ => {}
                }
            }
        } else if is_any_raw(CONTROLLERS, &log.address) {
            if let Some(event) = controller_events().decode(log) {
                controller_event(tx, log, &event, ctx)?;
            }
        } else if AUCTION_REGISTRAR.is_raw(&log.address) {
            if let Some(event) = auction_events().decode(log) {
                auction_event(tx, evm_tx, log, &event, ctx)?;
            }
        }
    }
    Ok(())
}

/// Funds released by a closed deed come back out of the `ENS` venue.
fn close_deeds(tx: &mut Transaction, evm_tx: &EvmTransaction) {
    let topic = deed_closed_topic();
    let Some(deed) = evm_tx
        .logs
        .iter()
        .find(|l| l.topics.first().map(|t| t.eq_ignore_ascii_case(topic)).unwrap_or(false))
    else {
        return;
    };
    for t in tx.transfers.iter_mut() {
        if t.from.is_address_of(&deed.address) && !t.amount.is_zero() {
            tracing::info!(amount = %t.amount, "ens deed closed");
            t.category = TransferCategory::Internal;
            t.from = insert_venue(&t.to, NAME);
            default_index(t, deed.index as f64);
        }
    }
}

fn controller_event(
    tx: &mut Transaction,
    log: &EvmTransactionLog,
    event: &DecodedLog,
    ctx: &ParserContext<'_>,
) -> Result<(), ClassifyError> {
    match event.name.as_str() {
        "NameRegistered" => {
            let owner = event
                .address("owner")
                .map(|o| ctx.account(&o))
                .map_err(|e| decode_failed(NAME, log, e))?;
            if !ctx.is_self(&owner) {
                return Ok(());
            }
            tracing::info!(name = event.string("name").unwrap_or_default(), "ens registration");
            if tx.method.is_empty() {
                tx.set_method("Registration");
            }
            let controller = ctx.account(&log.address);
            let native = ctx.meta.fee_asset.as_str();
            let index = log.index as f64;
            for t in tx.transfers.iter_mut().filter(|t| t.asset == native) {
                if t.from == owner && t.to == controller {
                    t.category = TransferCategory::SwapOut;
                    default_index(t, index);
                } else if t.from == controller && t.to == owner {
                    t.category = TransferCategory::Refund;
                    default_index(t, index + 1.0);
                }
            }
            for t in tx.transfers.iter_mut() {
                if is_name_asset(&t.asset) && t.to == owner {
                    t.category = TransferCategory::SwapIn;
                    default_index(t, index);
                }
            }
        }
        "NameRenewed" => tx.set_method("Renewal"),
        _ => {}
    }
    Ok(())
}

fn auction_event(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    log: &EvmTransactionLog,
    event: &DecodedLog,
    ctx: &ParserContext<'_>,
) -> Result<(), ClassifyError> {
    let registrar = ctx.account(&log.address);
    let native = ctx.meta.fee_asset.clone();
    let index = log.index as f64;
    let party = |name: &str| -> Result<Account, ClassifyError> {
        event
            .address(name)
            .map(|a| ctx.account(&a))
            .map_err(|e| decode_failed(NAME, log, e))
    };
    tracing::info!(event = %event.name, "ens auction");
    match event.name.as_str() {
        "AuctionStarted" => tx.set_method("Auction"),
        "NewBid" => {
            let bidder = party("bidder")?;
            if ctx.is_self(&bidder) {
                tx.set_method("Bid");
                if let Some(t) = tx
                    .transfers
                    .iter_mut()
                    .find(|t| t.asset == native && t.to == registrar && t.from == bidder)
                {
                    t.category = TransferCategory::Internal;
                    t.to = insert_venue(&t.from, NAME);
                    default_index(t, index);
                }
            }
        }
        "BidRevealed" => {
            let owner = party("owner")?;
            if called(evm_tx, &log.address) && ctx.is_self(&owner) {
                if let Some(t) = tx.transfers.iter_mut().find(|t| t.asset == native && t.to == owner) {
                    t.category = TransferCategory::Internal;
                    t.from = insert_venue(&t.to, NAME);
                    default_index(t, index);
                }
            }
            tx.set_method("Reveal");
        }
        "HashRegistered" => tx.set_method("Registration"),
        "HashReleased" => tx.set_method("Release"),
        "HashInvalidated" => tx.set_method("Invalidation"),
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_assets_use_the_label_as_token_id() {
        let mut label = [0u8; 32];
        label[31] = 42;
        assert_eq!(name_asset(&label), "ENS_42");
        assert!(is_name_asset("ENS_42"));
        assert!(!is_name_asset("ENSX"));
    }

    #[test]
    fn deed_topic_is_the_event_hash() {
        assert!(deed_closed_topic().starts_with("0x"));
        assert_eq!(deed_closed_topic().len(), 66);
    }
}
