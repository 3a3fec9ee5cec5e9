//! Per-call classification context.

use chainledger_core::account::Account;
use chainledger_core::address_book::AddressBook;
use chainledger_core::evm::EvmMetadata;
use std::collections::BTreeSet;

/// State carried across transactions within one `get_transactions` call.
///
/// A fresh session is created per call, so classification depends only on
/// the inputs of that call.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// `(owner, market)` pairs with an Idle deposit seen earlier in the run.
    pub idle_deposits: BTreeSet<(Account, Account)>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Everything a parser may read besides the transaction itself.
pub struct ParserContext<'a> {
    pub book: &'a AddressBook,
    pub meta: &'a EvmMetadata,
    pub session: &'a mut SessionState,
}

impl<'a> ParserContext<'a> {
    pub fn new(book: &'a AddressBook, meta: &'a EvmMetadata, session: &'a mut SessionState) -> Self {
        Self { book, meta, session }
    }

    /// Chain-qualified account for an address on this context's chain.
    pub fn account(&self, address: &str) -> Account {
        Account::on_chain(&self.meta.name, address)
    }

    /// Display name of an address (its asset symbol for tokens).
    pub fn name(&self, address: &str) -> String {
        self.book.get_name(&self.account(address), false)
    }

    pub fn decimals(&self, address: &str) -> u8 {
        self.book.get_decimals(&self.account(address))
    }

    pub fn is_self(&self, account: &Account) -> bool {
        self.book.is_self(account)
    }
}
