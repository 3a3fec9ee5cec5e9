//! Base decoding of one EVM transaction into a provisional [`Transaction`].
//!
//! The decoder reports what the chain says: the fee, the native value, the
//! internal calls and every generic token event. Categories come from the
//! Self/Exchange heuristic in [`get_transfer_category`] and are refined later
//! by the app parsers.

use alloy_primitives::{Address, U256};
use chainledger_core::account::Account;
use chainledger_core::amount::{parse_quantity, Amount};
use chainledger_core::evm::{EvmTransaction, EvmTransactionLog};
use chainledger_core::transaction::{Transaction, Transfer, TransferCategory};
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::abi::{DecodedLog, EventSet};
use crate::category::get_transfer_category;
use crate::context::ParserContext;
use crate::error::DecodeError;

pub const METHOD_FAILURE: &str = "Failure";
pub const METHOD_CREATION: &str = "Creation";
pub const METHOD_UNKNOWN: &str = "Unknown";

const ERC20_EVENTS: &[&str] = &[
    "event Transfer(address indexed from, address indexed to, uint256 amount)",
    "event Approval(address indexed from, address indexed to, uint256 amount)",
];

const ERC721_EVENTS: &[&str] =
    &["event Transfer(address indexed from, address indexed to, uint256 indexed tokenId)"];

const WRAPPED_NATIVE_EVENTS: &[&str] = &[
    "event Deposit(address indexed dst, uint256 wad)",
    "event Withdrawal(address indexed src, uint256 wad)",
];

fn erc20_events() -> &'static EventSet {
    static SET: OnceLock<EventSet> = OnceLock::new();
    SET.get_or_init(|| EventSet::parse_lossy(ERC20_EVENTS))
}

fn erc721_events() -> &'static EventSet {
    static SET: OnceLock<EventSet> = OnceLock::new();
    SET.get_or_init(|| EventSet::parse_lossy(ERC721_EVENTS))
}

pub(crate) fn wrapped_native_events() -> &'static EventSet {
    static SET: OnceLock<EventSet> = OnceLock::new();
    SET.get_or_init(|| EventSet::parse_lossy(WRAPPED_NATIVE_EVENTS))
}

/// The address a contract-creating transaction deploys to.
pub fn created_address(from: &str, nonce: u64) -> Result<String, DecodeError> {
    let sender = from.parse::<Address>().map_err(|e| DecodeError::InvalidHex {
        field: "from".to_string(),
        reason: e.to_string(),
    })?;
    Ok(sender.create(nonce).to_checksum(None))
}

/// True if the token at `address` is the wrapped form of the chain's fee
/// asset, eg WETH on Ethereum.
pub fn is_wrapped_native(address: &str, ctx: &ParserContext<'_>) -> bool {
    ctx.book.is_token(&ctx.account(address)) && ctx.name(address) == format!("W{}", ctx.meta.fee_asset)
}

/// `gasPrice * gasUsed` in the fee asset.
pub fn fee_amount(evm_tx: &EvmTransaction) -> Amount {
    let price = parse_quantity(&evm_tx.gas_price).unwrap_or(U256::ZERO);
    let used = parse_quantity(&evm_tx.gas_used).unwrap_or(U256::ZERO);
    Amount::from_wei(price.saturating_mul(used))
}

/// Decode the chain-truth transfers of `evm_tx`.
///
/// Token movements are kept when one side is Self or one of `watched`
/// (proxies the pipeline will later resolve to their owner).
pub fn decode_transaction(
    evm_tx: &EvmTransaction,
    ctx: &ParserContext<'_>,
    watched: &BTreeSet<Account>,
) -> Transaction {
    let meta = ctx.meta;
    let book = ctx.book;
    let mut tx = Transaction::new(format!("{}/{}", meta.name, evm_tx.hash), evm_tx.timestamp, &meta.name);
    let from = ctx.account(&evm_tx.from);

    if book.is_self(&from) {
        tx.transfers.push(
            Transfer::new(
                &meta.fee_asset,
                TransferCategory::Fee,
                from.clone(),
                Account::named(&meta.name),
                fee_amount(evm_tx),
            )
            .with_index(-1.0),
        );
    }

    if !evm_tx.succeeded() {
        tracing::info!(hash = %evm_tx.hash, "failed transaction");
        tx.set_method(METHOD_FAILURE);
        return tx;
    }

    let to = match &evm_tx.to {
        Some(to) => Some(ctx.account(to)),
        None => match created_address(&evm_tx.from, evm_tx.nonce) {
            Ok(created) => {
                tracing::info!(hash = %evm_tx.hash, contract = %created, "contract creation");
                tx.set_method(METHOD_CREATION);
                Some(ctx.account(&created))
            }
            Err(e) => {
                tracing::warn!(hash = %evm_tx.hash, error = %e, "can't derive created contract address");
                None
            }
        },
    };

    let value = Amount::parse_or_zero(&evm_tx.value);
    if let Some(to) = &to {
        if value.is_positive() && (book.is_self(&from) || book.is_self(to)) {
            tx.transfers.push(
                Transfer::new(
                    &meta.fee_asset,
                    get_transfer_category(&from, to, book),
                    from.clone(),
                    to.clone(),
                    value,
                )
                .with_index(0.0),
            );
        }
    }

    // Internal calls have no log index.
    for call in &evm_tx.transfers {
        let amount = Amount::parse_or_zero(&call.value);
        if amount.is_zero() {
            continue;
        }
        let (call_from, call_to) = (ctx.account(&call.from), ctx.account(&call.to));
        tx.transfers.push(Transfer::new(
            &meta.fee_asset,
            get_transfer_category(&call_from, &call_to, book),
            call_from,
            call_to,
            amount,
        ));
    }

    for log in &evm_tx.logs {
        decode_log(&mut tx, evm_tx, log, ctx, watched);
    }
    tx
}

fn involved(account: &Account, ctx: &ParserContext<'_>, watched: &BTreeSet<Account>) -> bool {
    ctx.book.is_self(account) || watched.contains(account)
}

fn decode_log(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    log: &EvmTransactionLog,
    ctx: &ParserContext<'_>,
    watched: &BTreeSet<Account>,
) {
    let token = ctx.account(&log.address);
    if ctx.book.is_token(&token) {
        if let Some(event) = erc20_events().decode(log) {
            token_event(tx, evm_tx, &event, ctx, watched);
        } else if is_wrapped_native(&log.address, ctx) {
            if let Some(event) = wrapped_native_events().decode(log) {
                wrapped_native_event(tx, &event, ctx);
            }
        }
    } else if ctx.book.is_nft(&token) {
        if let Some(event) = erc721_events().decode(log) {
            nft_event(tx, &event, ctx, watched);
        }
    }
}

fn endpoint(raw: Result<String, DecodeError>, token: &Account, ctx: &ParserContext<'_>) -> Option<Account> {
    let address = raw.ok()?;
    if address.eq_ignore_ascii_case(&Address::ZERO.to_checksum(None)) {
        Some(token.clone())
    } else {
        Some(ctx.account(&address))
    }
}

fn token_event(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    event: &DecodedLog,
    ctx: &ParserContext<'_>,
    watched: &BTreeSet<Account>,
) {
    let token = ctx.account(&event.address);
    let asset = ctx.name(&event.address);
    tx.push_app("ERC20");
    let called_directly = evm_tx
        .to
        .as_deref()
        .map(|to| to.eq_ignore_ascii_case(&event.address))
        .unwrap_or(false);
    match event.name.as_str() {
        "Transfer" => {
            let (Some(from), Some(to)) = (
                endpoint(event.address("from"), &token, ctx),
                endpoint(event.address("to"), &token, ctx),
            ) else {
                return;
            };
            if !involved(&from, ctx, watched) && !involved(&to, ctx, watched) {
                tracing::debug!(asset = %asset, "skipping token transfer that doesn't involve us");
                return;
            }
            let raw = match event.uint("amount") {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(asset = %asset, error = %e, "token transfer without amount");
                    return;
                }
            };
            let amount = Amount::from_units(raw, ctx.decimals(&event.address));
            tracing::debug!(asset = %asset, amount = %amount, "token transfer");
            let category = get_transfer_category(&from, &to, ctx.book);
            tx.transfers
                .push(Transfer::new(&asset, category, from, to, amount).with_index(event.index as f64));
            if called_directly {
                tx.set_method(format!("{asset} Transfer"));
            }
        }
        "Approval" => {
            if called_directly {
                tx.set_method(format!("{asset} Approval"));
            }
        }
        _ => {}
    }
}

fn wrapped_native_event(tx: &mut Transaction, event: &DecodedLog, ctx: &ParserContext<'_>) {
    let weth = ctx.account(&event.address);
    let asset = ctx.name(&event.address);
    let Ok(raw) = event.uint("wad") else {
        return;
    };
    let amount = Amount::from_units(raw, ctx.decimals(&event.address));
    let (from, to) = match (event.name.as_str(), event.address("dst"), event.address("src")) {
        ("Deposit", Ok(dst), _) => (weth.clone(), ctx.account(&dst)),
        ("Withdrawal", _, Ok(src)) => (ctx.account(&src), weth.clone()),
        _ => return,
    };
    let category = get_transfer_category(&from, &to, ctx.book);
    tx.transfers
        .push(Transfer::new(asset, category, from, to, amount).with_index(event.index as f64));
}

fn nft_event(tx: &mut Transaction, event: &DecodedLog, ctx: &ParserContext<'_>, watched: &BTreeSet<Account>) {
    let token = ctx.account(&event.address);
    let (Some(from), Some(to), Ok(id)) = (
        endpoint(event.address("from"), &token, ctx),
        endpoint(event.address("to"), &token, ctx),
        event.uint("tokenId"),
    ) else {
        return;
    };
    if !involved(&from, ctx, watched) && !involved(&to, ctx, watched) {
        return;
    }
    tx.push_app("ERC721");
    let asset = format!("{}_{}", ctx.name(&event.address), id);
    tracing::debug!(asset = %asset, "nft transfer");
    let category = get_transfer_category(&from, &to, ctx.book);
    tx.transfers
        .push(Transfer::new(asset, category, from, to, Amount::from_int(1)).with_index(event.index as f64));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SessionState;
    use chainledger_core::address_book::{AddressBook, AddressBookJson, AddressCategory, AddressEntry};
    use chainledger_core::evm::{EvmMetadata, EvmTransfer};
    use chrono::{TimeZone, Utc};

    const ME: &str = "0x1111111111111111111111111111111111111111";
    const FRIEND: &str = "0x2222222222222222222222222222222222222222";
    const DAI: &str = "0x6b175474e89094c44da98b954eedeac495271d0f";

    fn book() -> AddressBook {
        let mut json = AddressBookJson::new();
        json.insert(
            format!("Ethereum/{ME}"),
            AddressEntry::new(&format!("Ethereum/{ME}"), AddressCategory::Owned, "me"),
        );
        let dai = AddressEntry::new(&format!("Ethereum/{DAI}"), AddressCategory::Erc20, "DAI");
        AddressBook::new(json, &[dai], &[])
    }

    fn word(tail: &str) -> String {
        format!("0x{:0>64}", tail)
    }

    fn tx() -> EvmTransaction {
        EvmTransaction {
            hash: format!("0x{}", "a".repeat(64)),
            block: 1,
            timestamp: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
            from: ME.into(),
            to: Some(FRIEND.into()),
            value: "1.5".into(),
            nonce: 0,
            gas_price: "0x3b9aca00".into(),
            gas_used: "0x5208".into(),
            data: "0x".into(),
            index: 0,
            status: Some(1),
            logs: vec![],
            transfers: vec![],
        }
    }

    fn decode(evm_tx: &EvmTransaction) -> Transaction {
        let book = book();
        let meta = EvmMetadata::ethereum();
        let mut session = SessionState::new();
        let ctx = ParserContext::new(&book, &meta, &mut session);
        decode_transaction(evm_tx, &ctx, &BTreeSet::new())
    }

    #[test]
    fn fee_and_value_transfers() {
        let out = decode(&tx());
        assert_eq!(out.uuid, format!("Ethereum/0x{}", "a".repeat(64)));
        assert_eq!(out.transfers.len(), 2);
        let fee = &out.transfers[0];
        assert_eq!(fee.category, TransferCategory::Fee);
        assert_eq!(fee.to, Account::named("Ethereum"));
        // 1 gwei * 21000
        assert_eq!(fee.amount, Amount::parse("0.000021").unwrap());
        assert_eq!(fee.index, Some(-1.0));
        let value = &out.transfers[1];
        assert_eq!(value.category, TransferCategory::Expense);
        assert_eq!(value.amount, Amount::parse("1.5").unwrap());
    }

    #[test]
    fn failed_transaction_keeps_only_fee() {
        let mut evm_tx = tx();
        evm_tx.status = Some(0);
        let out = decode(&evm_tx);
        assert_eq!(out.method, METHOD_FAILURE);
        assert_eq!(out.transfers.len(), 1);
        assert_eq!(out.transfers[0].category, TransferCategory::Fee);
    }

    #[test]
    fn contract_creation_derives_address() {
        let mut evm_tx = tx();
        evm_tx.to = None;
        evm_tx.value = "0".into();
        let out = decode(&evm_tx);
        assert_eq!(out.method, METHOD_CREATION);
        let expected = created_address(ME, 0).unwrap();
        assert_eq!(expected.len(), 42);
        assert_ne!(expected.to_lowercase(), ME);
    }

    #[test]
    fn internal_calls_are_unindexed() {
        let mut evm_tx = tx();
        evm_tx.from = FRIEND.into();
        evm_tx.to = Some(DAI.into());
        evm_tx.value = "0".into();
        evm_tx.transfers = vec![
            EvmTransfer {
                block: 1,
                from: FRIEND.into(),
                hash: evm_tx.hash.clone(),
                timestamp: evm_tx.timestamp,
                to: ME.into(),
                value: "0.25".into(),
            },
            EvmTransfer {
                block: 1,
                from: FRIEND.into(),
                hash: evm_tx.hash.clone(),
                timestamp: evm_tx.timestamp,
                to: ME.into(),
                value: "0".into(),
            },
        ];
        let out = decode(&evm_tx);
        assert_eq!(out.transfers.len(), 1);
        assert_eq!(out.transfers[0].category, TransferCategory::Income);
        assert_eq!(out.transfers[0].index, None);
    }

    #[test]
    fn token_mint_uses_token_address() {
        let mut evm_tx = tx();
        evm_tx.value = "0".into();
        evm_tx.to = Some(DAI.into());
        evm_tx.from = FRIEND.into();
        evm_tx.logs = vec![EvmTransactionLog {
            address: DAI.into(),
            data: word("de0b6b3a7640000"),
            index: 7,
            topics: vec![
                erc20_events().topic("Transfer").unwrap().to_string(),
                word("0"),
                word(&ME[2..]),
            ],
        }];
        let out = decode(&evm_tx);
        assert_eq!(out.transfers.len(), 1);
        let minted = &out.transfers[0];
        assert_eq!(minted.asset, "DAI");
        assert!(minted.from.is_address_of(DAI));
        assert_eq!(minted.category, TransferCategory::Income);
        assert_eq!(minted.index, Some(7.0));
        assert_eq!(out.method, "DAI Transfer");
    }

    #[test]
    fn unrelated_token_transfers_are_skipped() {
        let mut evm_tx = tx();
        evm_tx.value = "0".into();
        evm_tx.from = FRIEND.into();
        evm_tx.logs = vec![EvmTransactionLog {
            address: DAI.into(),
            data: word("1"),
            index: 1,
            topics: vec![
                erc20_events().topic("Transfer").unwrap().to_string(),
                word(&FRIEND[2..]),
                word("3333333333333333333333333333333333333333"),
            ],
        }];
        assert!(decode(&evm_tx).transfers.is_empty());
    }
}
