//! Generic transfer classification from the address book alone.

use chainledger_core::account::Account;
use chainledger_core::address_book::AddressBook;
use chainledger_core::transaction::TransferCategory;

/// Provisional category of a movement `from -> to`.
///
/// Rules, first match wins: same account is `Noop`; both Self is
/// `Internal`; Self to a chain guard is `Fee`; Self to/from an exchange is
/// `SwapOut`/`SwapIn`; otherwise `Income`/`Expense` when exactly one side is
/// Self, else `Noop`.
pub fn get_transfer_category(from: &Account, to: &Account, book: &AddressBook) -> TransferCategory {
    if from == to {
        return TransferCategory::Noop;
    }
    let from_self = book.is_self(from);
    let to_self = book.is_self(to);
    if from_self && to_self {
        TransferCategory::Internal
    } else if from_self && book.is_guard(to) {
        TransferCategory::Fee
    } else if from_self && book.is_exchange(to) {
        TransferCategory::SwapOut
    } else if to_self && book.is_exchange(from) {
        TransferCategory::SwapIn
    } else if to_self {
        TransferCategory::Income
    } else if from_self {
        TransferCategory::Expense
    } else {
        TransferCategory::Noop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainledger_core::address_book::{AddressBookJson, AddressCategory, AddressEntry};

    const ME: &str = "Ethereum/0x1111111111111111111111111111111111111111";
    const ALSO_ME: &str = "Ethereum/0x1111111111111111111111111111111111111112";
    const DEX: &str = "Ethereum/0x2222222222222222222222222222222222222222";
    const STRANGER: &str = "Ethereum/0x3333333333333333333333333333333333333333";

    fn book() -> AddressBook {
        let mut json = AddressBookJson::new();
        for (addr, name) in [(ME, "me"), (ALSO_ME, "also-me")] {
            json.insert(addr.into(), AddressEntry::new(addr, AddressCategory::Owned, name));
        }
        AddressBook::new(json, &[AddressEntry::new(DEX, AddressCategory::Exchange, "dex")], &[])
    }

    fn cat(from: &str, to: &str) -> TransferCategory {
        get_transfer_category(&Account::parse(from), &Account::parse(to), &book())
    }

    #[test]
    fn classification_rules() {
        assert_eq!(cat(ME, ME), TransferCategory::Noop);
        assert_eq!(cat(ME, ALSO_ME), TransferCategory::Internal);
        assert_eq!(cat(ME, "Ethereum"), TransferCategory::Fee);
        assert_eq!(cat(ME, DEX), TransferCategory::SwapOut);
        assert_eq!(cat(DEX, ME), TransferCategory::SwapIn);
        assert_eq!(cat(STRANGER, ME), TransferCategory::Income);
        assert_eq!(cat(ME, STRANGER), TransferCategory::Expense);
        assert_eq!(cat(STRANGER, DEX), TransferCategory::Noop);
    }

    #[test]
    fn venue_of_self_is_internal() {
        let venue = format!("{ME}/Tornado");
        assert_eq!(cat(ME, &venue), TransferCategory::Internal);
    }
}
