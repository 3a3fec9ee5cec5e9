//! Chain-qualified accounts.
//!
//! An account is written `<Chain>/<Address>` or `<Chain>/<Address>/<Venue>...`.
//! A bare address (no chain prefix) is chain-agnostic. Non-address accounts
//! such as a chain guard (`"Ethereum"`) are kept as a plain name.
//!
//! EVM addresses are EIP-55 checksummed on parse so that equality and hashing
//! are insensitive to the casing the data source used.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AccountError;

/// A structured account key: optional chain, address (or name), venue path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Account {
    pub chain: Option<String>,
    pub address: String,
    pub venue: Vec<String>,
}

impl Account {
    /// Build a validated, chain-qualified EVM account.
    pub fn evm(chain: impl Into<String>, address: &str) -> Result<Self, AccountError> {
        Ok(Self {
            chain: Some(chain.into()),
            address: normalize_address(address)?,
            venue: Vec::new(),
        })
    }

    /// Chain-qualified account for an address reported by a data source.
    /// Malformed addresses are kept verbatim.
    pub fn on_chain(chain: &str, address: &str) -> Self {
        Self::evm(chain, address).unwrap_or_else(|_| Self {
            chain: Some(chain.to_string()),
            address: address.to_string(),
            venue: Vec::new(),
        })
    }

    /// True if the address part equals `address`, ignoring case.
    pub fn is_address_of(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address)
    }

    /// A named pseudo-account with no on-chain address (eg a chain guard).
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            chain: None,
            address: name.into(),
            venue: Vec::new(),
        }
    }

    /// Parse any account string. Never fails: strings that contain no EVM
    /// address are kept verbatim as a named account.
    pub fn parse(raw: &str) -> Self {
        let segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
        match segments.iter().position(|s| is_address(s)) {
            Some(i) => Self {
                chain: if i == 0 { None } else { Some(segments[..i].join("/")) },
                address: normalize_address(segments[i]).unwrap_or_else(|_| segments[i].to_string()),
                venue: segments[i + 1..].iter().map(|s| s.to_string()).collect(),
            },
            None => Self {
                chain: None,
                address: segments.first().map(|s| s.to_string()).unwrap_or_default(),
                venue: segments.iter().skip(1).map(|s| s.to_string()).collect(),
            },
        }
    }

    /// True if the address part is a 20-byte hex address.
    pub fn is_evm(&self) -> bool {
        is_address(&self.address)
    }

    pub fn is_empty(&self) -> bool {
        self.address.is_empty()
    }

    pub fn has_venue(&self) -> bool {
        !self.venue.is_empty()
    }

    /// The same owner with one more venue segment appended.
    pub fn with_venue(&self, venue: impl Into<String>) -> Self {
        let mut out = self.clone();
        out.venue.push(venue.into());
        out
    }

    /// The account without any venue segments.
    pub fn base(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            address: self.address.clone(),
            venue: Vec::new(),
        }
    }

    /// Case-insensitive `chain/address` key (venue dropped).
    pub fn lookup_key(&self) -> String {
        match &self.chain {
            Some(chain) => format!("{}/{}", chain, self.address).to_lowercase(),
            None => self.address.to_lowercase(),
        }
    }

    /// Case-insensitive address-only key.
    pub fn address_key(&self) -> String {
        self.address.to_lowercase()
    }

    /// `0xABCD..EF01` style short form of the address part.
    pub fn abbreviated(&self) -> String {
        abbreviate(&self.address)
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(chain) = &self.chain {
            write!(f, "{chain}/")?;
        }
        write!(f, "{}", self.address)?;
        for venue in &self.venue {
            write!(f, "/{venue}")?;
        }
        Ok(())
    }
}

impl FromStr for Account {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for Account {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<&str> for Account {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<Account> for String {
    fn from(a: Account) -> Self {
        a.to_string()
    }
}

/// Append a venue segment to an owner account (same owner, deeper path).
pub fn insert_venue(owner: &Account, venue: &str) -> Account {
    owner.with_venue(venue)
}

/// True for `0x` + 40 hex chars, any casing.
pub fn is_address(s: &str) -> bool {
    let hex = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(h) => h,
        None => return false,
    };
    hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit())
}

/// EIP-55 checksum a raw address.
pub fn normalize_address(raw: &str) -> Result<String, AccountError> {
    if !is_address(raw) {
        return Err(AccountError::InvalidAddress {
            address: raw.to_string(),
        });
    }
    Address::from_str(raw)
        .map(|a| a.to_checksum(None))
        .map_err(|_| AccountError::InvalidAddress {
            address: raw.to_string(),
        })
}

/// Shorten a hex address to `0xabcd..ef01`. Non-addresses are returned as-is.
pub fn abbreviate(address: &str) -> String {
    if is_address(address) {
        format!("{}..{}", &address[..6], &address[address.len() - 4..])
    } else {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VITALIK: &str = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045";
    const VITALIK_CHECKSUM: &str = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045";

    #[test]
    fn parse_chain_address_venue() {
        let acc = Account::parse(&format!("Ethereum/{VITALIK}/Maker-CDP-12"));
        assert_eq!(acc.chain.as_deref(), Some("Ethereum"));
        assert_eq!(acc.address, VITALIK_CHECKSUM);
        assert_eq!(acc.venue, vec!["Maker-CDP-12".to_string()]);
        assert_eq!(acc.to_string(), format!("Ethereum/{VITALIK_CHECKSUM}/Maker-CDP-12"));
    }

    #[test]
    fn bare_address_is_chain_agnostic() {
        let acc = Account::parse(VITALIK);
        assert!(acc.chain.is_none());
        assert!(acc.is_evm());
        assert_eq!(acc.lookup_key(), VITALIK);
    }

    #[test]
    fn named_accounts_round_trip() {
        let guard = Account::parse("Ethereum");
        assert_eq!(guard, Account::named("Ethereum"));
        assert!(!guard.is_evm());
        assert_eq!(guard.to_string(), "Ethereum");
    }

    #[test]
    fn equality_ignores_input_casing() {
        let lower = Account::parse(&format!("Ethereum/{VITALIK}"));
        let upper = Account::parse(&format!("Ethereum/{}", VITALIK.to_uppercase().replace("0X", "0x")));
        assert_eq!(lower, upper);
    }

    #[test]
    fn insert_venue_keeps_owner() {
        let owner = Account::evm("Ethereum", VITALIK).unwrap();
        let venue = insert_venue(&owner, "Aave");
        assert_eq!(venue.base(), owner);
        assert!(venue.has_venue());
        assert_eq!(venue.to_string(), format!("Ethereum/{VITALIK_CHECKSUM}/Aave"));
    }

    #[test]
    fn serde_as_string() {
        let acc = Account::parse(&format!("Ethereum/{VITALIK}"));
        let json = serde_json::to_string(&acc).unwrap();
        assert_eq!(json, format!("\"Ethereum/{VITALIK_CHECKSUM}\""));
        let back: Account = serde_json::from_str(&json).unwrap();
        assert_eq!(back, acc);
    }

    #[test]
    fn abbreviate_address() {
        assert_eq!(abbreviate(VITALIK_CHECKSUM), "0xd8dA..6045");
        assert_eq!(abbreviate("Tornado"), "Tornado");
        assert!(normalize_address("0x1234").is_err());
    }
}
