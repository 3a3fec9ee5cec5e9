//! Public address registry shipped with the crate.
//!
//! Every app's addresses plus well-known burn addresses. Merged into each
//! [`AddressBook`] after the user's own entries, so a user entry for the
//! same address wins.

use chainledger_core::address_book::{AddressBook, AddressBookJson, AddressCategory, AddressEntry};
use std::sync::OnceLock;

use crate::app::App;
use crate::apps::{proxy, BUILTIN_APPS};

const BURN: &[(&str, &str)] = &[
    ("NullAddress", "0x0000000000000000000000000000000000000000"),
    ("BurnAddress", "0x000000000000000000000000000000000000dEaD"),
    ("BurnAddress", "0x00000000000000000000000000000000DeaDBeef"),
];

/// Registry entries for a set of apps, in app order.
pub fn app_entries(apps: &[App]) -> Vec<AddressEntry> {
    apps.iter()
        .flat_map(|app| app.all_addresses())
        .map(|address| address.entry())
        .collect()
}

/// Burn addresses and every built-in app address.
pub fn public_entries() -> &'static [AddressEntry] {
    static ENTRIES: OnceLock<Vec<AddressEntry>> = OnceLock::new();
    ENTRIES.get_or_init(|| {
        let mut entries: Vec<AddressEntry> = BURN
            .iter()
            .map(|(name, address)| AddressEntry::new(address, AddressCategory::Burn, name))
            .collect();
        entries.extend(app_entries(BUILTIN_APPS));
        entries.extend(app_entries(&[proxy::APP]));
        entries
    })
}

/// Build an address book from user entries, the public registry and the
/// addresses of any extra apps.
pub fn address_book(json: AddressBookJson, extra_apps: &[App]) -> AddressBook {
    AddressBook::new(json, public_entries(), &app_entries(extra_apps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainledger_core::account::Account;
    use chainledger_core::address_book::get_address_entry_error;

    #[test]
    fn every_public_entry_is_valid() {
        for entry in public_entries() {
            assert_eq!(get_address_entry_error(entry), None, "{entry:?}");
        }
    }

    #[test]
    fn user_entries_take_precedence() {
        let weth = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";
        let mut json = AddressBookJson::new();
        json.insert(
            weth.to_string(),
            AddressEntry::new(&format!("Ethereum/{weth}"), AddressCategory::Private, "my-weth"),
        );
        let book = address_book(json, &[]);
        assert_eq!(book.get_name(&Account::on_chain("Ethereum", weth), false), "my-weth");

        let book = address_book(AddressBookJson::new(), &[]);
        assert_eq!(book.get_name(&Account::on_chain("Ethereum", weth), false), "WETH");
        assert!(book.is_token(&Account::on_chain("Ethereum", weth)));
    }

    #[test]
    fn burn_addresses_are_known() {
        let book = address_book(AddressBookJson::new(), &[]);
        let dead = Account::on_chain("Ethereum", "0x000000000000000000000000000000000000dead");
        assert_eq!(book.get_category(&dead), AddressCategory::Burn);
    }
}
