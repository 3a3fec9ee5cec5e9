//! DSProxy resolution.
//!
//! A DSProxy executes calls on behalf of its owner, so transfers routed
//! through it show the proxy instead of the owner. This pass runs after
//! every app parser and moves proxy endpoints back onto the transaction's
//! origin.

use chainledger_core::account::Account;
use chainledger_core::address_book::AddressCategory;
use chainledger_core::amount::Amount;
use chainledger_core::evm::EvmTransaction;
use chainledger_core::transaction::{Transaction, TransferCategory};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use crate::abi::EventSet;
use crate::app::{is_any_raw, App, AppAddress};
use crate::category::get_transfer_category;
use crate::context::ParserContext;
use crate::decoder::is_wrapped_native;
use crate::fingerprint;

use super::is_one_of;

pub const NAME: &str = "DSProxy";

pub const PROXIES: &[AppAddress] = &[AppAddress::proxy("oasis-proxy", "0x793ebbe21607e4f04788f89c7a9b97320773ec59")];

pub const FACTORIES: &[AppAddress] = &[
    AppAddress::defi("maker-proxy-registry", "0x4678f0a6958e4d2bc4f1baf7bc52e8f3564f3fe4"),
    AppAddress::defi("maker-proxy-factory", "0xa26e15c895efc0616177b7c1e7270a4c7d51c997"),
];

/// Registered for its addresses only: the pass itself is driven by
/// [`crate::pipeline`], not by the app parser loop.
pub const APP: App = App {
    name: NAME,
    addresses: &[PROXIES, FACTORIES],
    insert: &[],
    modify: &[],
    swap_venue: false,
};

const FACTORY_EVENTS: &[&str] =
    &["event Created(address indexed sender, address indexed owner, address proxy, address cache)"];

const EXECUTE_SIGNATURES: &[&str] = &["execute(address,bytes)", "execute(bytes,bytes)"];

/// Largest leftover, as a fraction (1/n) of the proxied input, absorbed as dust.
const DUST_DIVISOR: u64 = 10;

fn factory_events() -> &'static EventSet {
    static SET: OnceLock<EventSet> = OnceLock::new();
    SET.get_or_init(|| EventSet::parse_lossy(FACTORY_EVENTS))
}

fn execute_selectors() -> &'static [String] {
    static SELECTORS: OnceLock<Vec<String>> = OnceLock::new();
    SELECTORS.get_or_init(|| EXECUTE_SIGNATURES.iter().map(|sig| fingerprint::selector(sig)).collect())
}

/// Proxy accounts visible in this transaction.
pub fn find_proxies(evm_tx: &EvmTransaction, ctx: &ParserContext<'_>) -> BTreeSet<Account> {
    let chain = ctx.meta.name.as_str();
    let mut proxies: BTreeSet<Account> = PROXIES
        .iter()
        .filter(|p| p.chain == chain)
        .map(|p| ctx.account(p.address))
        .collect();

    proxies.extend(
        ctx.book
            .entries()
            .filter(|e| e.category == AddressCategory::Proxy)
            .map(|e| Account::parse(&e.address))
            .filter(|a| a.chain.as_deref().map(|c| c == chain).unwrap_or(true))
            .map(|a| ctx.account(&a.address)),
    );

    for log in &evm_tx.logs {
        if is_any_raw(FACTORIES, &log.address) {
            let created = factory_events()
                .decode(log)
                .filter(|e| e.name == "Created")
                .and_then(|e| e.address("proxy").ok());
            if let Some(proxy) = created {
                tracing::debug!(%proxy, "proxy created");
                proxies.insert(ctx.account(&proxy));
            }
        } else if execute_selectors()
            .iter()
            .any(|sel| fingerprint::topic_has_selector(&log.topics, sel))
        {
            proxies.insert(ctx.account(&log.address));
        }
    }
    proxies
}

fn is_proxy(proxies: &BTreeSet<Account>, account: &Account) -> bool {
    proxies.contains(&account.base())
}

/// The origin with the venue path of the replaced proxy account kept.
fn rebase(account: &Account, origin: &Account) -> Account {
    Account {
        venue: account.venue.clone(),
        ..origin.clone()
    }
}

fn is_swap_venue(account: &Account, apps: &[App], ctx: &ParserContext<'_>) -> bool {
    ctx.book.is_exchange(account)
        || is_wrapped_native(&account.address, ctx)
        || apps.iter().any(|app| app.swap_venue && app.owns(account))
}

/// Categories the decoder derives on its own. Anything else was set by an
/// app parser and is left alone.
fn is_derived(category: TransferCategory) -> bool {
    is_one_of(
        category,
        &[
            TransferCategory::Expense,
            TransferCategory::Income,
            TransferCategory::Internal,
            TransferCategory::Noop,
        ],
    )
}

/// Rewrite proxy endpoints to the origin and absorb leftover dust.
pub fn resolve_proxies(
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &ParserContext<'_>,
    proxies: &BTreeSet<Account>,
    apps: &[App],
) {
    let created = evm_tx.logs.iter().any(|log| {
        is_any_raw(FACTORIES, &log.address)
            && factory_events().decode(log).map(|e| e.name == "Created").unwrap_or(false)
    });
    if created {
        tx.push_app(NAME);
        tx.set_method("Proxy Creation");
    }

    let origin = ctx.account(&evm_tx.from);
    if proxies.is_empty() || !ctx.is_self(&origin) {
        return;
    }

    // what the origin sent into its proxies, per asset
    let mut inputs: BTreeMap<String, Amount> = BTreeMap::new();
    for t in &tx.transfers {
        if t.from.base() == origin && is_proxy(proxies, &t.to) {
            let total = inputs.entry(t.asset.clone()).or_insert(Amount::ZERO);
            *total = *total + t.amount;
        }
    }

    let mut outputs: BTreeMap<String, (Amount, usize)> = BTreeMap::new();
    let mut touched = false;
    for (i, t) in tx.transfers.iter_mut().enumerate() {
        let from_proxy = is_proxy(proxies, &t.from);
        let to_proxy = is_proxy(proxies, &t.to);
        if !from_proxy && !to_proxy {
            continue;
        }
        touched = true;
        if from_proxy {
            t.from = rebase(&t.from, &origin);
        }
        if to_proxy {
            t.to = rebase(&t.to, &origin);
        }
        if !is_derived(t.category) {
            continue;
        }
        t.category = get_transfer_category(&t.from, &t.to, ctx.book);
        if from_proxy && !to_proxy && is_swap_venue(&t.to, apps, ctx) {
            t.category = TransferCategory::SwapOut;
        } else if to_proxy && !from_proxy && is_swap_venue(&t.from, apps, ctx) {
            t.category = TransferCategory::SwapIn;
        }
        if from_proxy && t.category == TransferCategory::SwapOut {
            let entry = outputs.entry(t.asset.clone()).or_insert((Amount::ZERO, i));
            entry.0 = entry.0 + t.amount;
        }
    }
    if touched {
        tx.push_app(NAME);
    }

    for (asset, (sent, first)) in outputs {
        let Some(input) = inputs.get(&asset) else {
            continue;
        };
        let leftover = *input - sent;
        if leftover.is_positive() && leftover < input.div_int(DUST_DIVISOR) {
            tracing::debug!(%asset, dust = %leftover, "absorbing proxy dust");
            tx.transfers[first].amount = tx.transfers[first].amount + leftover;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebase_keeps_venue() {
        let origin = Account::parse("Ethereum/0x1111111111111111111111111111111111111111");
        let proxied = Account::parse("Ethereum/0x2222222222222222222222222222222222222222/Maker-Vault-ETH-A");
        let rebased = rebase(&proxied, &origin);
        assert_eq!(rebased.base(), origin);
        assert_eq!(rebased.venue, vec!["Maker-Vault-ETH-A".to_string()]);
    }

    #[test]
    fn execute_selectors_are_four_bytes() {
        for sel in execute_selectors() {
            assert_eq!(sel.len(), 10);
        }
        assert_eq!(execute_selectors()[0], "0x1cff79cd");
    }
}
