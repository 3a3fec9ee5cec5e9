//! Classified transactions: the unit consumed by downstream accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::account::Account;
use crate::amount::Amount;

/// Closed set of transfer categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransferCategory {
    Fee,
    Expense,
    Income,
    Internal,
    Deposit,
    Withdraw,
    SwapIn,
    SwapOut,
    Borrow,
    Repay,
    Refund,
    Noop,
}

impl TransferCategory {
    pub const ALL: [TransferCategory; 12] = [
        Self::Fee,
        Self::Expense,
        Self::Income,
        Self::Internal,
        Self::Deposit,
        Self::Withdraw,
        Self::SwapIn,
        Self::SwapOut,
        Self::Borrow,
        Self::Repay,
        Self::Refund,
        Self::Noop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fee => "Fee",
            Self::Expense => "Expense",
            Self::Income => "Income",
            Self::Internal => "Internal",
            Self::Deposit => "Deposit",
            Self::Withdraw => "Withdraw",
            Self::SwapIn => "SwapIn",
            Self::SwapOut => "SwapOut",
            Self::Borrow => "Borrow",
            Self::Repay => "Repay",
            Self::Refund => "Refund",
            Self::Noop => "Noop",
        }
    }
}

impl fmt::Display for TransferCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One asset movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub asset: String,
    pub category: TransferCategory,
    pub from: Account,
    pub to: Account,
    pub amount: Amount,
    /// Position within the transaction. Fractional values sit between
    /// siblings; `None` sorts last.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<f64>,
}

impl Transfer {
    pub fn new(
        asset: impl Into<String>,
        category: TransferCategory,
        from: Account,
        to: Account,
        amount: Amount,
    ) -> Self {
        Self {
            asset: asset.into(),
            category,
            from,
            to,
            amount,
            index: None,
        }
    }

    pub fn with_index(mut self, index: f64) -> Self {
        self.index = Some(index);
        self
    }
}

/// A classified transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// `<Chain>/<hash>` for chain data.
    pub uuid: String,
    pub date: DateTime<Utc>,
    pub method: String,
    pub apps: Vec<String>,
    pub sources: Vec<String>,
    pub transfers: Vec<Transfer>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tag: BTreeMap<String, String>,
}

impl Transaction {
    pub fn new(uuid: impl Into<String>, date: DateTime<Utc>, source: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            date,
            method: String::new(),
            apps: Vec::new(),
            sources: vec![source.into()],
            transfers: Vec::new(),
            tag: BTreeMap::new(),
        }
    }

    /// Record that an app recognised something in this transaction.
    pub fn push_app(&mut self, app: &str) {
        self.apps.push(app.to_string());
    }

    pub fn set_method(&mut self, method: impl Into<String>) {
        self.method = method.into();
    }

    /// Transaction hash part of the uuid.
    pub fn hash(&self) -> &str {
        self.uuid.rsplit('/').next().unwrap_or(&self.uuid)
    }
}

/// Ordering used for transfers: by index, un-indexed last.
pub fn compare_index(a: Option<f64>, b: Option<f64>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// ─── Validators ──────────────────────────────────────────────────────────────

/// Structural check for one transfer. `None` means valid.
pub fn get_transfer_error(transfer: &Transfer) -> Option<String> {
    if transfer.asset.trim().is_empty() {
        return Some("Transfer is missing an asset".to_string());
    }
    if transfer.from.is_empty() {
        return Some(format!("{} transfer is missing a sender", transfer.asset));
    }
    if transfer.to.is_empty() {
        return Some(format!("{} transfer is missing a recipient", transfer.asset));
    }
    if transfer.amount.is_negative() {
        return Some(format!(
            "{} transfer has a negative amount {}",
            transfer.asset, transfer.amount
        ));
    }
    if let Some(index) = transfer.index {
        if !index.is_finite() {
            return Some(format!("{} transfer has a non-finite index", transfer.asset));
        }
    }
    None
}

/// Structural check for one transaction. `None` means valid.
pub fn get_transaction_error(tx: &Transaction) -> Option<String> {
    if tx.uuid.trim().is_empty() {
        return Some("Transaction is missing a uuid".to_string());
    }
    tx.transfers
        .iter()
        .find_map(get_transfer_error)
        .map(|e| format!("{}: {}", tx.uuid, e))
}

/// Structural check for a transaction list, including uuid uniqueness.
pub fn get_transactions_error(txns: &[Transaction]) -> Option<String> {
    let mut seen = std::collections::HashSet::new();
    for tx in txns {
        if let Some(e) = get_transaction_error(tx) {
            return Some(e);
        }
        if !seen.insert(tx.uuid.as_str()) {
            return Some(format!("Duplicate transaction uuid {}", tx.uuid));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn transfer(asset: &str, index: Option<f64>) -> Transfer {
        let mut t = Transfer::new(
            asset,
            TransferCategory::Expense,
            Account::parse("0x1111111111111111111111111111111111111111"),
            Account::parse("0x2222222222222222222222222222222222222222"),
            Amount::parse("1").unwrap(),
        );
        t.index = index;
        t
    }

    #[test]
    fn category_round_trips_through_json() {
        for category in TransferCategory::ALL {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category));
        }
    }

    #[test]
    fn transfer_serializes_amount_as_string() {
        let value = serde_json::to_value(transfer("ETH", Some(1.0))).unwrap();
        assert_eq!(value["amount"], "1");
        assert_eq!(value["category"], "Expense");
        let without_index = serde_json::to_value(transfer("ETH", None)).unwrap();
        assert!(without_index.get("index").is_none());
    }

    #[test]
    fn validators_flag_missing_fields() {
        assert!(get_transfer_error(&transfer("ETH", Some(0.0))).is_none());
        assert!(get_transfer_error(&transfer("", None)).is_some());
        let mut bad = transfer("ETH", None);
        bad.to = Account::named("");
        assert!(get_transfer_error(&bad).is_some());

        let date = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let mut tx = Transaction::new("Ethereum/0xabc", date, "Ethereum");
        tx.transfers.push(transfer("ETH", None));
        assert!(get_transaction_error(&tx).is_none());
        assert_eq!(tx.hash(), "0xabc");
        assert!(get_transactions_error(&[tx.clone(), tx]).is_some());
    }

    #[test]
    fn index_ordering_puts_none_last() {
        use std::cmp::Ordering;
        assert_eq!(compare_index(Some(1.0), None), Ordering::Less);
        assert_eq!(compare_index(None, Some(-1.0)), Ordering::Greater);
        assert_eq!(compare_index(Some(0.5), Some(1.0)), Ordering::Less);
    }
}
