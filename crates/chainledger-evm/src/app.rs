//! Protocol app definitions.
//!
//! An app bundles the addresses of one protocol with the parsers that
//! understand its logs. Apps are plain `static` records assembled into a
//! fixed, ordered list; nothing is registered at runtime.

use chainledger_core::account::Account;
use chainledger_core::address_book::{AddressCategory, AddressEntry};
use chainledger_core::error::ClassifyError;
use chainledger_core::evm::EvmTransaction;
use chainledger_core::transaction::Transaction;

use crate::context::ParserContext;

/// One decode step. Insert parsers may push transfers; modify parsers only
/// rewrite the category and endpoints of existing ones.
pub type Parser = fn(&mut Transaction, &EvmTransaction, &mut ParserContext<'_>) -> Result<(), ClassifyError>;

/// A known contract address shipped with an app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppAddress {
    pub name: &'static str,
    pub chain: &'static str,
    pub address: &'static str,
    pub category: AddressCategory,
    pub decimals: Option<u8>,
}

impl AppAddress {
    pub const fn new(name: &'static str, address: &'static str, category: AddressCategory) -> Self {
        Self {
            name,
            chain: "Ethereum",
            address,
            category,
            decimals: None,
        }
    }

    pub const fn defi(name: &'static str, address: &'static str) -> Self {
        Self::new(name, address, AddressCategory::Defi)
    }

    pub const fn exchange(name: &'static str, address: &'static str) -> Self {
        Self::new(name, address, AddressCategory::Exchange)
    }

    pub const fn proxy(name: &'static str, address: &'static str) -> Self {
        Self::new(name, address, AddressCategory::Proxy)
    }

    pub const fn token(name: &'static str, address: &'static str) -> Self {
        Self::new(name, address, AddressCategory::Erc20)
    }

    pub const fn decimals(mut self, decimals: u8) -> Self {
        self.decimals = Some(decimals);
        self
    }

    pub const fn on(mut self, chain: &'static str) -> Self {
        self.chain = chain;
        self
    }

    /// True if `account` (ignoring venues) is this address.
    pub fn is(&self, account: &Account) -> bool {
        account.is_address_of(self.address)
            && account.chain.as_deref().map(|c| c == self.chain).unwrap_or(true)
    }

    /// True if the raw address string is this address.
    pub fn is_raw(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address)
    }

    pub fn entry(&self) -> AddressEntry {
        let entry = AddressEntry::new(&format!("{}/{}", self.chain, self.address), self.category, self.name);
        match self.decimals {
            Some(d) => entry.with_decimals(d),
            None => entry,
        }
    }
}

/// True if `account` is any of `addresses`.
pub fn is_any(addresses: &[AppAddress], account: &Account) -> bool {
    addresses.iter().any(|a| a.is(account))
}

/// True if the raw address string is any of `addresses`.
pub fn is_any_raw(addresses: &[AppAddress], address: &str) -> bool {
    addresses.iter().any(|a| a.is_raw(address))
}

/// A protocol parser bundle.
#[derive(Debug, Clone, Copy)]
pub struct App {
    pub name: &'static str,
    pub addresses: &'static [&'static [AppAddress]],
    pub insert: &'static [Parser],
    pub modify: &'static [Parser],
    /// Counterparties of this app are swap venues for the proxy pass.
    pub swap_venue: bool,
}

impl App {
    pub fn all_addresses(&self) -> impl Iterator<Item = &'static AppAddress> {
        let groups: &'static [&'static [AppAddress]] = self.addresses;
        groups.iter().flat_map(|group| group.iter())
    }

    pub fn owns(&self, account: &Account) -> bool {
        self.all_addresses().any(|a| a.is(account))
    }
}
