//! Parser pipeline: decode, run every app's insert parsers, then every
//! app's modify parsers, then the proxy pass, then finalise.

use chainledger_core::address_book::AddressBook;
use chainledger_core::evm::{EvmMetadata, EvmTransaction};
use chainledger_core::merge::merge_transactions;
use chainledger_core::transaction::{compare_index, Transaction, TransferCategory};

use crate::app::{App, Parser};
use crate::apps::proxy::{find_proxies, resolve_proxies};
use crate::apps::BUILTIN_APPS;
use crate::context::{ParserContext, SessionState};
use crate::decoder::{decode_transaction, METHOD_UNKNOWN};

/// Ordered registry of apps applied to every transaction.
#[derive(Debug, Clone)]
pub struct Pipeline {
    apps: Vec<App>,
}

impl Pipeline {
    /// The built-in apps only.
    pub fn new() -> Self {
        Self {
            apps: BUILTIN_APPS.to_vec(),
        }
    }

    /// Built-in apps followed by `extra`, which therefore win method ties.
    pub fn with_apps(extra: &[App]) -> Self {
        let mut pipeline = Self::new();
        for app in extra {
            pipeline.register(*app);
        }
        pipeline
    }

    /// Append an app after every app registered so far.
    pub fn register(&mut self, app: App) {
        self.apps.push(app);
    }

    pub fn apps(&self) -> &[App] {
        &self.apps
    }

    /// Decode and classify one transaction.
    pub fn parse(
        &self,
        evm_tx: &EvmTransaction,
        meta: &EvmMetadata,
        book: &AddressBook,
        session: &mut SessionState,
    ) -> Transaction {
        let mut ctx = ParserContext::new(book, meta, session);
        let proxies = find_proxies(evm_tx, &ctx);
        let mut tx = decode_transaction(evm_tx, &ctx, &proxies);

        if evm_tx.succeeded() {
            for app in &self.apps {
                for parser in app.insert {
                    run(app, *parser, &mut tx, evm_tx, &mut ctx);
                }
            }
            for app in &self.apps {
                for parser in app.modify {
                    run(app, *parser, &mut tx, evm_tx, &mut ctx);
                }
            }
            resolve_proxies(&mut tx, evm_tx, &ctx, &proxies, &self.apps);
        }

        finalize(&mut tx);
        tracing::debug!(
            uuid = %tx.uuid,
            method = %tx.method,
            transfers = tx.transfers.len(),
            "parsed transaction"
        );
        tx
    }

    /// Classify a batch in chronological order with one shared session.
    /// Transactions without any transfer are left out.
    pub fn parse_all<'a, I>(&self, evm_txs: I, meta: &EvmMetadata, book: &AddressBook) -> Vec<Transaction>
    where
        I: IntoIterator<Item = &'a EvmTransaction>,
    {
        let mut sorted: Vec<&EvmTransaction> = evm_txs.into_iter().collect();
        sorted.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.block.cmp(&b.block))
                .then(a.index.cmp(&b.index))
        });

        let mut session = SessionState::new();
        let parsed: Vec<Transaction> = sorted
            .into_iter()
            .map(|evm_tx| self.parse(evm_tx, meta, book, &mut session))
            .collect();
        let mut out = Vec::with_capacity(parsed.len());
        merge_transactions(&mut out, parsed);
        out
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn run(
    app: &App,
    parser: Parser,
    tx: &mut Transaction,
    evm_tx: &EvmTransaction,
    ctx: &mut ParserContext<'_>,
) {
    if let Err(e) = parser(tx, evm_tx, ctx) {
        tracing::warn!(app = app.name, hash = %evm_tx.hash, error = %e, "parser failed");
    }
}

/// Dedup apps, default the method, drop no-ops, order transfers.
pub fn finalize(tx: &mut Transaction) {
    tx.apps.sort();
    tx.apps.dedup();
    if tx.method.is_empty() {
        tx.method = METHOD_UNKNOWN.to_string();
    }
    tx.transfers.retain(|t| t.category != TransferCategory::Noop);
    tx.transfers.sort_by(|a, b| compare_index(a.index, b.index));
}

/// Classify one transaction with the built-in apps and a fresh session.
pub fn parse_transaction(
    evm_tx: &EvmTransaction,
    meta: &EvmMetadata,
    book: &AddressBook,
    extra_apps: &[App],
) -> Transaction {
    Pipeline::with_apps(extra_apps).parse(evm_tx, meta, book, &mut SessionState::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainledger_core::account::Account;
    use chainledger_core::amount::Amount;
    use chainledger_core::transaction::Transfer;
    use chrono::Utc;

    #[test]
    fn finalize_orders_and_cleans() {
        let a = Account::parse("Ethereum/0x1111111111111111111111111111111111111111");
        let b = Account::parse("Ethereum/0x2222222222222222222222222222222222222222");
        let mut tx = Transaction::new("Ethereum/0xabc", Utc::now(), "Ethereum");
        tx.push_app("Uniswap");
        tx.push_app("ERC20");
        tx.push_app("Uniswap");
        let t = |cat, index: Option<f64>| {
            let mut t = Transfer::new("ETH", cat, a.clone(), b.clone(), Amount::from_int(1));
            t.index = index;
            t
        };
        tx.transfers = vec![
            t(TransferCategory::Expense, None),
            t(TransferCategory::Noop, Some(0.0)),
            t(TransferCategory::SwapIn, Some(3.0)),
            t(TransferCategory::Fee, Some(-1.0)),
        ];

        finalize(&mut tx);

        assert_eq!(tx.apps, vec!["ERC20".to_string(), "Uniswap".to_string()]);
        assert_eq!(tx.method, "Unknown");
        let categories: Vec<_> = tx.transfers.iter().map(|t| t.category).collect();
        assert_eq!(
            categories,
            vec![TransferCategory::Fee, TransferCategory::SwapIn, TransferCategory::Expense]
        );
    }

    #[test]
    fn extra_apps_run_after_builtins() {
        const EXTRA: App = App {
            name: "Extra",
            addresses: &[],
            insert: &[],
            modify: &[],
            swap_venue: false,
        };
        let pipeline = Pipeline::with_apps(&[EXTRA]);
        assert_eq!(pipeline.apps().len(), BUILTIN_APPS.len() + 1);
        assert_eq!(pipeline.apps().last().map(|a| a.name), Some("Extra"));
    }
}
