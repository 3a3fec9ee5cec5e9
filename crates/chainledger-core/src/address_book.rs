//! Address book: resolves accounts to categories, names and decimals.
//!
//! Built once per session from three sources merged in priority order (user
//! entries, the public registry, caller extras). The first entry seen for an
//! address wins; later duplicates are dropped with a warning and invalid
//! entries are logged and skipped. After construction the book is read-only
//! except for [`AddressBook::add_self`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::account::{abbreviate, is_address, normalize_address, Account};
use crate::error::AddressBookError;

/// Chain guard pseudo-accounts recognised without any entry.
pub const KNOWN_GUARDS: &[&str] = &["Ethereum", "Polygon"];

/// Decimals assumed for tokens without an explicit value.
pub const DEFAULT_DECIMALS: u8 = 18;

// ─── Categories ──────────────────────────────────────────────────────────────

/// Closed set of address categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AddressCategory {
    Burn,
    Defi,
    Donation,
    #[serde(rename = "ERC20")]
    Erc20,
    Exchange,
    #[serde(rename = "NFT")]
    Nft,
    Private,
    Proxy,
    Public,
    /// Controlled by the operator.
    #[serde(rename = "Self")]
    Owned,
}

impl AddressCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Burn => "Burn",
            Self::Defi => "Defi",
            Self::Donation => "Donation",
            Self::Erc20 => "ERC20",
            Self::Exchange => "Exchange",
            Self::Nft => "NFT",
            Self::Private => "Private",
            Self::Proxy => "Proxy",
            Self::Public => "Public",
            Self::Owned => "Self",
        }
    }
}

impl fmt::Display for AddressCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Entries ─────────────────────────────────────────────────────────────────

/// One address book row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressEntry {
    pub address: String,
    pub category: AddressCategory,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
}

impl AddressEntry {
    pub fn new(address: &str, category: AddressCategory, name: &str) -> Self {
        Self {
            address: address.to_string(),
            category,
            name: name.to_string(),
            guard: None,
            decimals: None,
        }
    }

    pub fn with_decimals(mut self, decimals: u8) -> Self {
        self.decimals = Some(decimals);
        self
    }

    pub fn with_guard(mut self, guard: &str) -> Self {
        self.guard = Some(guard.to_string());
        self
    }

    /// Check the entry, returning a normalized copy.
    pub fn validate(&self) -> Result<AddressEntry, AddressBookError> {
        if let Some(reason) = get_address_entry_error(self) {
            return Err(AddressBookError::InvalidEntry {
                address: self.address.clone(),
                reason,
            });
        }
        let account = Account::parse(&self.address);
        let mut normalized = self.clone();
        normalized.address = Account {
            chain: account.chain,
            address: normalize_address(&account.address)?,
            venue: Vec::new(),
        }
        .to_string();
        Ok(normalized)
    }
}

/// Persisted form: address -> entry, in insertion order.
pub type AddressBookJson = IndexMap<String, AddressEntry>;

/// Structural check for one entry. `None` means valid.
pub fn get_address_entry_error(entry: &AddressEntry) -> Option<String> {
    let account = Account::parse(&entry.address);
    if !is_address(&account.address) {
        return Some(format!("Invalid address: {}", entry.address));
    }
    if account.has_venue() {
        return Some(format!("Entry address must not carry a venue: {}", entry.address));
    }
    if entry.name.trim().is_empty() {
        return Some(format!("Missing name for {}", entry.address));
    }
    None
}

/// Structural check for a whole address book document.
pub fn get_address_book_error(json: &AddressBookJson) -> Option<String> {
    json.values().find_map(get_address_entry_error)
}

// ─── AddressBook ─────────────────────────────────────────────────────────────

/// Read-mostly resolver over merged address entries.
#[derive(Debug, Clone, Default)]
pub struct AddressBook {
    /// Lowercase `chain/address` or `address` -> entry.
    entries: IndexMap<String, AddressEntry>,
    /// Lowercase address -> key of the first entry for it (any chain).
    by_address: IndexMap<String, String>,
    guards: BTreeSet<String>,
    json: AddressBookJson,
}

impl AddressBook {
    /// Merge user entries, the public registry and extras (first wins).
    pub fn new(json: AddressBookJson, public: &[AddressEntry], extras: &[AddressEntry]) -> Self {
        let mut book = Self {
            guards: KNOWN_GUARDS.iter().map(|g| g.to_string()).collect(),
            json: json.clone(),
            ..Default::default()
        };
        let candidates = json.values().chain(public.iter()).chain(extras.iter());
        for candidate in candidates {
            match candidate.validate() {
                Ok(entry) => book.insert(entry),
                Err(e) => tracing::warn!(error = %e, "skipping address book entry"),
            }
        }
        tracing::debug!(entries = book.entries.len(), "address book ready");
        book
    }

    /// A book built only from user entries.
    pub fn from_json(json: AddressBookJson) -> Self {
        Self::new(json, &[], &[])
    }

    fn insert(&mut self, entry: AddressEntry) {
        let account = Account::parse(&entry.address);
        let key = account.lookup_key();
        if self.entries.contains_key(&key) {
            tracing::warn!(address = %entry.address, "address book has multiple entries for address");
            return;
        }
        if let Some(guard) = &entry.guard {
            self.guards.insert(guard.clone());
        }
        self.by_address
            .entry(account.address_key())
            .or_insert_with(|| key.clone());
        self.entries.insert(key, entry);
    }

    /// Resolve an account (venue segments ignored) to its entry.
    pub fn get_entry(&self, account: &Account) -> Option<&AddressEntry> {
        if !account.is_evm() {
            return None;
        }
        self.entries
            .get(&account.lookup_key())
            .or_else(|| self.entries.get(&account.address_key()))
            .or_else(|| {
                if account.chain.is_some() {
                    return None;
                }
                self.by_address
                    .get(&account.address_key())
                    .and_then(|key| self.entries.get(key))
            })
    }

    /// Category of the account; `Private` when unknown.
    pub fn get_category(&self, account: &Account) -> AddressCategory {
        self.get_entry(account)
            .map(|e| e.category)
            .unwrap_or(AddressCategory::Private)
    }

    /// Display name. Unknown addresses degrade to an abbreviation; names of
    /// pseudo-accounts are returned as-is. With `with_venue` the venue
    /// segments are prefixed to the name.
    pub fn get_name(&self, account: &Account, with_venue: bool) -> String {
        if account.is_empty() {
            return String::new();
        }
        let name = if account.is_evm() {
            self.get_entry(account)
                .map(|e| e.name.clone())
                .unwrap_or_else(|| abbreviate(&account.address))
        } else {
            account.address.clone()
        };
        if with_venue && account.has_venue() {
            format!("{}/{}", account.venue.join("/"), name)
        } else {
            name
        }
    }

    /// Token decimals, defaulting to 18.
    pub fn get_decimals(&self, account: &Account) -> u8 {
        self.get_entry(account)
            .and_then(|e| e.decimals)
            .unwrap_or(DEFAULT_DECIMALS)
    }

    /// The guard (security provider) responsible for the account.
    pub fn get_guard(&self, account: &Account) -> Option<String> {
        if let Some(guard) = self.get_entry(account).and_then(|e| e.guard.clone()) {
            return Some(guard);
        }
        if account.is_evm() {
            return Some(account.chain.clone().unwrap_or_else(|| "Ethereum".to_string()));
        }
        self.is_guard(account).then(|| account.address.clone())
    }

    /// True for chain guard pseudo-accounts such as `Ethereum`.
    pub fn is_guard(&self, account: &Account) -> bool {
        !account.is_evm() && account.chain.is_none() && self.guards.contains(&account.address)
    }

    pub fn is_category(&self, account: &Account, category: AddressCategory) -> bool {
        self.get_entry(account).map(|e| e.category) == Some(category)
    }

    pub fn is_self(&self, account: &Account) -> bool {
        self.is_category(account, AddressCategory::Owned)
    }

    pub fn is_token(&self, account: &Account) -> bool {
        self.is_category(account, AddressCategory::Erc20)
    }

    pub fn is_nft(&self, account: &Account) -> bool {
        self.is_category(account, AddressCategory::Nft)
    }

    pub fn is_exchange(&self, account: &Account) -> bool {
        self.is_category(account, AddressCategory::Exchange)
    }

    pub fn is_proxy(&self, account: &Account) -> bool {
        self.is_category(account, AddressCategory::Proxy)
    }

    /// Every Self account, in book order.
    pub fn self_accounts(&self) -> Vec<Account> {
        self.entries
            .values()
            .filter(|e| e.category == AddressCategory::Owned)
            .map(|e| Account::parse(&e.address))
            .collect()
    }

    /// All resolved entries in merge order.
    pub fn entries(&self) -> impl Iterator<Item = &AddressEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a new self address. Existing entries are left untouched.
    pub fn add_self(&mut self, address: &str, name: Option<&str>) -> Result<(), AddressBookError> {
        let account = Account::parse(address);
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| abbreviate(&account.address));
        let entry = AddressEntry::new(address, AddressCategory::Owned, &name).validate()?;
        if self.get_entry(&account).is_some() {
            tracing::warn!(address = %entry.address, "address already present, not adding");
            return Ok(());
        }
        self.json.insert(entry.address.clone(), entry.clone());
        self.insert(entry);
        Ok(())
    }

    /// The user-supplied document (plus any appended self addresses).
    pub fn json(&self) -> &AddressBookJson {
        &self.json
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "0x1111111111111111111111111111111111111111";
    const DEX: &str = "0x2222222222222222222222222222222222222222";
    const TOKEN: &str = "0x3333333333333333333333333333333333333333";

    fn book() -> AddressBook {
        let mut json = AddressBookJson::new();
        json.insert(ALICE.into(), AddressEntry::new(ALICE, AddressCategory::Owned, "alice"));
        let public = vec![
            AddressEntry::new(DEX, AddressCategory::Exchange, "Dex"),
            AddressEntry::new(TOKEN, AddressCategory::Erc20, "USDX").with_decimals(6),
            // duplicate of a user entry: dropped
            AddressEntry::new(ALICE, AddressCategory::Public, "not-alice"),
            AddressEntry::new("0xnothex", AddressCategory::Public, "broken"),
        ];
        AddressBook::new(json, &public, &[])
    }

    #[test]
    fn first_entry_wins_and_invalid_skipped() {
        let book = book();
        assert_eq!(book.len(), 3);
        let alice = Account::parse(ALICE);
        assert!(book.is_self(&alice));
        assert_eq!(book.get_name(&alice, false), "alice");
    }

    #[test]
    fn case_insensitive_and_chain_qualified_lookup() {
        let book = book();
        let upper = Account::parse(&format!("Ethereum/{}", TOKEN.to_uppercase().replace("0X", "0x")));
        assert!(book.is_token(&upper));
        assert_eq!(book.get_decimals(&upper), 6);
        assert_eq!(book.get_decimals(&Account::parse(DEX)), 18);
    }

    #[test]
    fn venue_accounts_resolve_to_owner() {
        let book = book();
        let vault = Account::parse(&format!("Ethereum/{ALICE}/Maker-DSR"));
        assert!(book.is_self(&vault));
        assert_eq!(book.get_name(&vault, true), "Maker-DSR/alice");
    }

    #[test]
    fn unknown_defaults() {
        let book = book();
        let stranger = Account::parse("0xabcdef0123456789abcdef0123456789abcdef01");
        assert_eq!(book.get_category(&stranger), AddressCategory::Private);
        assert!(!book.is_self(&stranger));
        assert_eq!(book.get_name(&stranger, false).to_lowercase(), "0xabcd..ef01");
        assert_eq!(book.get_name(&Account::named("Ethereum"), false), "Ethereum");
        assert!(book.is_guard(&Account::named("Ethereum")));
    }

    #[test]
    fn add_self_appends() {
        let mut book = book();
        let bob = "0x4444444444444444444444444444444444444444";
        book.add_self(bob, Some("bob")).unwrap();
        assert!(book.is_self(&Account::parse(bob)));
        assert_eq!(book.self_accounts().len(), 2);
        assert_eq!(book.json().len(), 2);
        assert!(book.add_self("nope", None).is_err());
    }

    #[test]
    fn category_serde_names() {
        let json = serde_json::to_string(&AddressCategory::Owned).unwrap();
        assert_eq!(json, "\"Self\"");
        let cat: AddressCategory = serde_json::from_str("\"ERC20\"").unwrap();
        assert_eq!(cat, AddressCategory::Erc20);
    }
}
