//! Merge/dedup layer for classified transactions.
//!
//! The running ledger is kept in ascending date order and keyed by uuid.
//! Re-merging a transaction replaces the stored copy, so merging the same
//! input twice is a no-op.

use crate::transaction::Transaction;
use std::collections::HashMap;

/// What happened to one merged transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Carried no transfers.
    Skipped,
    /// Replaced an existing entry with the same uuid.
    Replaced,
    Inserted,
}

/// Merge one transaction into a chronologically sorted list, in place.
pub fn merge_transaction(transactions: &mut Vec<Transaction>, incoming: Transaction) -> MergeOutcome {
    if incoming.transfers.is_empty() {
        tracing::debug!(uuid = %incoming.uuid, "skipped transaction with zero transfers");
        return MergeOutcome::Skipped;
    }
    let outcome = match transactions.iter().position(|tx| tx.uuid == incoming.uuid) {
        Some(i) if transactions[i].date == incoming.date => {
            transactions[i] = incoming;
            return MergeOutcome::Replaced;
        }
        Some(i) => {
            transactions.remove(i);
            MergeOutcome::Replaced
        }
        None => MergeOutcome::Inserted,
    };
    let at = transactions.partition_point(|tx| tx.date <= incoming.date);
    tracing::debug!(uuid = %incoming.uuid, method = %incoming.method, ?outcome, "merged transaction");
    transactions.insert(at, incoming);
    outcome
}

/// Merge a batch of transactions into a chronologically sorted `existing`,
/// returning how many were new. Uuids are looked up through an index and the
/// ledger is re-sorted once, stably, so equal dates keep arrival order.
pub fn merge_transactions(existing: &mut Vec<Transaction>, incoming: Vec<Transaction>) -> usize {
    let mut positions: HashMap<String, usize> = existing
        .iter()
        .enumerate()
        .map(|(i, tx)| (tx.uuid.clone(), i))
        .collect();
    let mut inserted = 0;
    let mut moved = false;
    for tx in incoming {
        if tx.transfers.is_empty() {
            tracing::debug!(uuid = %tx.uuid, "skipped transaction with zero transfers");
            continue;
        }
        match positions.get(&tx.uuid) {
            Some(&i) => {
                moved |= existing[i].date != tx.date;
                existing[i] = tx;
            }
            None => {
                moved |= existing.last().map_or(false, |last| last.date > tx.date);
                positions.insert(tx.uuid.clone(), existing.len());
                existing.push(tx);
                inserted += 1;
            }
        }
    }
    if moved {
        existing.sort_by(|a, b| a.date.cmp(&b.date));
    }
    tracing::debug!(inserted, total = existing.len(), "merged batch");
    inserted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::amount::Amount;
    use crate::transaction::{Transfer, TransferCategory};
    use chrono::{TimeZone, Utc};

    fn tx(uuid: &str, day: u32, method: &str) -> Transaction {
        let date = Utc.with_ymd_and_hms(2021, 1, day, 0, 0, 0).unwrap();
        let mut tx = Transaction::new(uuid, date, "Ethereum");
        tx.method = method.to_string();
        tx.transfers.push(Transfer::new(
            "ETH",
            TransferCategory::Income,
            Account::parse("0x1111111111111111111111111111111111111111"),
            Account::parse("0x2222222222222222222222222222222222222222"),
            Amount::from_int(1),
        ));
        tx
    }

    #[test]
    fn keeps_chronological_order() {
        let mut ledger = vec![];
        merge_transactions(&mut ledger, vec![tx("c", 3, ""), tx("a", 1, ""), tx("b", 2, "")]);
        let uuids: Vec<_> = ledger.iter().map(|t| t.uuid.as_str()).collect();
        assert_eq!(uuids, vec!["a", "b", "c"]);
    }

    #[test]
    fn merging_twice_is_a_noop() {
        let batch = vec![tx("a", 1, "Trade"), tx("b", 2, "Deposit")];
        let mut ledger = vec![];
        assert_eq!(merge_transactions(&mut ledger, batch.clone()), 2);
        let snapshot = ledger.clone();
        assert_eq!(merge_transactions(&mut ledger, batch), 0);
        assert_eq!(ledger, snapshot);
    }

    #[test]
    fn batch_replaces_by_uuid_and_resorts() {
        let mut ledger = vec![];
        merge_transactions(&mut ledger, vec![tx("a", 1, ""), tx("b", 2, ""), tx("c", 3, "")]);
        // b moves to the end, d slots in between
        let inserted = merge_transactions(&mut ledger, vec![tx("b", 9, "Moved"), tx("d", 2, ""), tx("d", 2, "Again")]);
        assert_eq!(inserted, 1);
        let uuids: Vec<_> = ledger.iter().map(|t| t.uuid.as_str()).collect();
        assert_eq!(uuids, vec!["a", "d", "c", "b"]);
        assert_eq!(ledger[1].method, "Again");
        assert_eq!(ledger[3].method, "Moved");
    }

    #[test]
    fn large_batches_merge_once_per_uuid() {
        let batch: Vec<Transaction> = (0..5_000)
            .map(|i| tx(&format!("0x{i:064x}"), 1 + (i % 28) as u32, ""))
            .collect();
        let mut ledger = vec![];
        assert_eq!(merge_transactions(&mut ledger, batch.clone()), 5_000);
        assert_eq!(merge_transactions(&mut ledger, batch), 0);
        assert_eq!(ledger.len(), 5_000);
        assert!(ledger.windows(2).all(|w| w[0].date <= w[1].date));
    }

    #[test]
    fn duplicates_replace_and_empty_are_skipped() {
        let mut ledger = vec![tx("a", 1, "Old")];
        assert_eq!(merge_transaction(&mut ledger, tx("a", 1, "New")), MergeOutcome::Replaced);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].method, "New");

        let mut empty = tx("z", 5, "");
        empty.transfers.clear();
        assert_eq!(merge_transaction(&mut ledger, empty), MergeOutcome::Skipped);
        assert_eq!(ledger.len(), 1);
    }
}
