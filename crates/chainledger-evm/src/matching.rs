//! Closest-amount matching of decoded protocol events to transfers.
//!
//! Protocol events often report an amount that differs slightly from the
//! token transfer it describes (interest accrual, rounding, fees). A parser
//! looks for the transfer of the right asset whose amount is within a
//! tolerance of the decoded one and takes the closest.

use chainledger_core::amount::Amount;
use chainledger_core::transaction::{compare_index, Transfer};
use std::cmp::Ordering;

/// Tolerance of 10%.
pub const TEN_PERCENT: u64 = 10;
/// Tolerance of 1%.
pub const ONE_PERCENT: u64 = 100;

/// Assets treated as interchangeable for collateral matching.
pub const ETHISH: &[&str] = &["WETH", "ETH", "PETH"];

/// True if `a` and `b` are the same asset or both in `equivalent`.
pub fn assets_match(a: &str, b: &str, equivalent: &[&str]) -> bool {
    a == b || (equivalent.contains(&a) && equivalent.contains(&b))
}

/// `amount / divisor`, the allowed distance from `amount`.
pub fn tolerance(amount: &Amount, divisor: u64) -> Amount {
    amount.abs().div_int(divisor)
}

/// Index into `transfers` of the closest candidate within tolerance.
///
/// Candidates must satisfy `filter` and lie within `target / divisor` of
/// `target`. Ties go to the lower transfer index (un-indexed last), then to
/// the earlier position in the list.
pub fn find_closest<F>(transfers: &[Transfer], target: &Amount, divisor: u64, filter: F) -> Option<usize>
where
    F: Fn(&Transfer) -> bool,
{
    let target = target.abs();
    let allowed = tolerance(&target, divisor);
    transfers
        .iter()
        .enumerate()
        .filter(|(_, t)| filter(t) && t.amount.is_close(&target, &allowed))
        .min_by(|(i, a), (j, b)| {
            a.amount
                .abs_diff(&target)
                .cmp(&b.amount.abs_diff(&target))
                .then_with(|| compare_index(a.index, b.index))
                .then_with(|| i.cmp(j))
        })
        .map(|(i, _)| i)
}

/// [`find_closest`] restricted to one asset (or its equivalents).
pub fn find_asset_transfer(
    transfers: &[Transfer],
    asset: &str,
    target: &Amount,
    divisor: u64,
    equivalent: &[&str],
) -> Option<usize> {
    find_closest(transfers, target, divisor, |t| assets_match(&t.asset, asset, equivalent))
}

/// Ordering helper re-exported for parsers that sort candidates.
pub fn by_index(a: &Transfer, b: &Transfer) -> Ordering {
    compare_index(a.index, b.index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainledger_core::account::Account;
    use chainledger_core::transaction::TransferCategory;

    fn t(asset: &str, amount: &str, index: Option<f64>) -> Transfer {
        let mut t = Transfer::new(
            asset,
            TransferCategory::Expense,
            Account::named("a"),
            Account::named("b"),
            Amount::parse(amount).unwrap(),
        );
        t.index = index;
        t
    }

    #[test]
    fn picks_smallest_difference_within_tolerance() {
        let transfers = vec![t("DAI", "95", Some(1.0)), t("DAI", "101", Some(2.0)), t("DAI", "150", Some(3.0))];
        let target = Amount::parse("100").unwrap();
        assert_eq!(find_asset_transfer(&transfers, "DAI", &target, TEN_PERCENT, &[]), Some(1));
        assert_eq!(find_asset_transfer(&transfers, "USDC", &target, TEN_PERCENT, &[]), None);
        let far = Amount::parse("130").unwrap();
        assert_eq!(find_asset_transfer(&transfers, "DAI", &far, ONE_PERCENT, &[]), None);
    }

    #[test]
    fn ties_prefer_lower_index_then_position() {
        let target = Amount::parse("100").unwrap();
        let transfers = vec![t("DAI", "99", None), t("DAI", "101", Some(5.0)), t("DAI", "101", Some(4.0))];
        assert_eq!(find_asset_transfer(&transfers, "DAI", &target, TEN_PERCENT, &[]), Some(2));
        let unindexed = vec![t("DAI", "99", None), t("DAI", "101", None)];
        assert_eq!(find_asset_transfer(&unindexed, "DAI", &target, TEN_PERCENT, &[]), Some(0));
    }

    #[test]
    fn ethish_equivalence() {
        let transfers = vec![t("ETH", "2", Some(0.0))];
        let target = Amount::parse("2").unwrap();
        assert_eq!(find_asset_transfer(&transfers, "WETH", &target, TEN_PERCENT, ETHISH), Some(0));
        assert!(!assets_match("DAI", "WETH", ETHISH));
    }
}
