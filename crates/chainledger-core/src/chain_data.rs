//! Persisted chain data: per-address hash history, internal calls and fully
//! fetched transactions.
//!
//! This is the only mutable persisted entity. Every mutation is additive:
//! histories are append-only sets, transactions are keyed by hash and only a
//! structurally invalid record is ever replaced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::evm::{get_evm_transaction_error, get_evm_transfer_error, EvmTransaction, EvmTransfer};

/// Sync bookkeeping for one address.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressHistory {
    pub history: Vec<String>,
    /// Set once the address has been fully synced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Persisted chain data document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChainDataJson {
    #[serde(default)]
    pub addresses: BTreeMap<String, AddressHistory>,
    /// Internal calls, possibly several per hash.
    #[serde(default)]
    pub calls: Vec<EvmTransfer>,
    /// Lowercase hash -> transaction.
    #[serde(default)]
    pub transactions: BTreeMap<String, EvmTransaction>,
}

fn hash_key(hash: &str) -> String {
    hash.to_lowercase()
}

impl ChainDataJson {
    /// Decode a persisted document. Records that fail structural validation
    /// are dropped so they get fetched again; the rest is kept. Fails only
    /// when the document itself doesn't deserialize.
    pub fn load(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut json: ChainDataJson = serde_json::from_value(value)?;
        let dropped = json.drop_invalid();
        if dropped > 0 {
            tracing::warn!(dropped, "dropped invalid chain data records, they will be fetched again");
        }
        Ok(json)
    }

    /// Like [`ChainDataJson::load`], but a document that doesn't deserialize
    /// degrades to empty.
    pub fn from_value(value: serde_json::Value) -> Self {
        Self::load(value).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "malformed chain data, starting empty");
            Self::default()
        })
    }

    /// Remove transactions and calls that fail structural validation, and
    /// re-key valid transactions by their lowercase hash. Histories are kept,
    /// so removed transactions show up in [`missing_transactions`].
    /// Returns how many records were removed.
    ///
    /// [`missing_transactions`]: ChainDataJson::missing_transactions
    pub fn drop_invalid(&mut self) -> usize {
        let mut dropped = 0;
        for (key, tx) in std::mem::take(&mut self.transactions) {
            match get_evm_transaction_error(&tx) {
                Some(e) => {
                    tracing::warn!(%key, error = %e, "dropping invalid cached transaction");
                    dropped += 1;
                }
                None => {
                    self.transactions.insert(hash_key(&tx.hash), tx);
                }
            }
        }
        let before = self.calls.len();
        self.calls.retain(|call| match get_evm_transfer_error(call) {
            Some(e) => {
                tracing::warn!(hash = %call.hash, error = %e, "dropping invalid cached call");
                false
            }
            None => true,
        });
        dropped + before - self.calls.len()
    }

    /// Add hashes to an address history. Returns how many were new.
    pub fn record_history(&mut self, address: &str, hashes: &[String]) -> usize {
        let entry = self.addresses.entry(address.to_string()).or_default();
        let mut added = 0;
        for hash in hashes {
            let key = hash_key(hash);
            if !entry.history.contains(&key) {
                entry.history.push(key);
                added += 1;
            }
        }
        added
    }

    pub fn set_last_updated(&mut self, address: &str, at: DateTime<Utc>) {
        self.addresses.entry(address.to_string()).or_default().last_updated = Some(at);
    }

    pub fn last_updated(&self, address: &str) -> Option<DateTime<Utc>> {
        self.addresses.get(address).and_then(|a| a.last_updated)
    }

    pub fn history(&self, address: &str) -> &[String] {
        self.addresses
            .get(address)
            .map(|a| a.history.as_slice())
            .unwrap_or(&[])
    }

    /// Merge internal calls. A candidate is dropped when the pre-merge
    /// snapshot already holds an identical call; identical candidates within
    /// one batch are all kept. Returns how many were added.
    pub fn merge_calls(&mut self, candidates: Vec<EvmTransfer>) -> usize {
        let snapshot_len = self.calls.len();
        let mut added = 0;
        for call in candidates {
            if let Some(e) = get_evm_transfer_error(&call) {
                tracing::warn!(error = %e, "skipping malformed call");
                continue;
            }
            let duplicates = self.calls[..snapshot_len]
                .iter()
                .filter(|existing| existing.same_call(&call))
                .count();
            if duplicates >= 1 {
                continue;
            }
            self.calls.push(call);
            added += 1;
        }
        added
    }

    /// True if a structurally valid record exists for the hash.
    pub fn has_valid_transaction(&self, hash: &str) -> bool {
        self.transactions
            .get(&hash_key(hash))
            .map(|tx| get_evm_transaction_error(tx).is_none())
            .unwrap_or(false)
    }

    /// Store a fetched transaction. Its internal calls are moved into the
    /// call list. An existing valid record is kept; returns true if stored.
    pub fn insert_transaction(&mut self, mut tx: EvmTransaction) -> bool {
        if let Some(e) = get_evm_transaction_error(&tx) {
            tracing::warn!(hash = %tx.hash, error = %e, "refusing to store invalid transaction");
            return false;
        }
        if self.has_valid_transaction(&tx.hash) {
            return false;
        }
        let calls = std::mem::take(&mut tx.transfers);
        self.merge_calls(calls);
        self.transactions.insert(hash_key(&tx.hash), tx);
        true
    }

    /// A transaction with its internal calls attached.
    pub fn get_transaction(&self, hash: &str) -> Option<EvmTransaction> {
        let mut tx = self.transactions.get(&hash_key(hash))?.clone();
        tx.transfers = self
            .calls
            .iter()
            .filter(|call| call.hash.eq_ignore_ascii_case(hash))
            .cloned()
            .collect();
        Some(tx)
    }

    /// Hashes referenced by any history but not yet fetched validly.
    pub fn missing_transactions(&self) -> Vec<String> {
        let mut missing: Vec<String> = self
            .addresses
            .values()
            .flat_map(|a| a.history.iter())
            .filter(|hash| !self.has_valid_transaction(hash))
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    /// Fold another document into this one.
    pub fn merge(&mut self, other: ChainDataJson) {
        for (address, incoming) in other.addresses {
            self.record_history(&address, &incoming.history);
            if let Some(at) = incoming.last_updated {
                let entry = self.addresses.entry(address).or_default();
                entry.last_updated = Some(entry.last_updated.map_or(at, |prev| prev.max(at)));
            }
        }
        self.merge_calls(other.calls);
        for (_, tx) in other.transactions {
            self.insert_transaction(tx);
        }
    }
}

/// Structural check for a chain data document. `None` means valid.
pub fn get_chain_data_error(json: &ChainDataJson) -> Option<String> {
    for (key, tx) in &json.transactions {
        if !key.eq_ignore_ascii_case(&tx.hash) {
            return Some(format!("Transaction keyed {} has hash {}", key, tx.hash));
        }
        if let Some(e) = get_evm_transaction_error(tx) {
            return Some(e);
        }
    }
    json.calls.iter().find_map(get_evm_transfer_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::tests::sample_tx;
    use crate::evm::EvmTransactionLog;
    use chrono::TimeZone;

    fn call(hash_byte: char, value: &str) -> EvmTransfer {
        EvmTransfer {
            block: 1,
            from: "0x1111111111111111111111111111111111111111".into(),
            hash: format!("0x{}", hash_byte.to_string().repeat(64)),
            timestamp: Utc.with_ymd_and_hms(2021, 3, 1, 12, 0, 0).unwrap(),
            to: "0x2222222222222222222222222222222222222222".into(),
            value: value.into(),
        }
    }

    #[test]
    fn history_is_an_append_only_set() {
        let mut json = ChainDataJson::default();
        let hashes = vec!["0xAB".to_string(), "0xab".to_string(), "0xcd".to_string()];
        assert_eq!(json.record_history("0x1", &hashes), 2);
        assert_eq!(json.record_history("0x1", &hashes), 0);
        assert_eq!(json.history("0x1"), &["0xab".to_string(), "0xcd".to_string()]);
    }

    #[test]
    fn snapshot_dedup_keeps_simultaneous_identical_calls() {
        let mut json = ChainDataJson::default();
        // two genuinely distinct identical calls in one batch
        assert_eq!(json.merge_calls(vec![call('a', "1"), call('a', "1")]), 2);
        // seen again from another address: nothing new
        assert_eq!(json.merge_calls(vec![call('a', "1"), call('a', "1")]), 0);
        assert_eq!(json.merge_calls(vec![call('a', "2")]), 1);
        assert_eq!(json.calls.len(), 3);
    }

    #[test]
    fn transactions_are_stored_once() {
        let mut json = ChainDataJson::default();
        let mut tx = sample_tx('a');
        tx.transfers.push(call('a', "0.1"));
        assert!(json.insert_transaction(tx.clone()));
        assert!(!json.insert_transaction(tx.clone()));
        assert_eq!(json.transactions.len(), 1);
        assert_eq!(json.calls.len(), 1);
        let stored = json.get_transaction(&tx.hash.to_uppercase().replace("0X", "0x")).unwrap();
        assert_eq!(stored.transfers.len(), 1);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut json = ChainDataJson::default();
        json.record_history("0x1", &[sample_tx('a').hash]);
        json.insert_transaction(sample_tx('a'));
        json.merge_calls(vec![call('a', "1")]);
        let before = json.clone();
        json.merge(before.clone());
        assert_eq!(json, before);
    }

    #[test]
    fn missing_lists_unfetched_hashes() {
        let mut json = ChainDataJson::default();
        json.record_history("0x1", &[sample_tx('a').hash, sample_tx('b').hash]);
        json.insert_transaction(sample_tx('a'));
        assert_eq!(json.missing_transactions(), vec![sample_tx('b').hash]);
    }

    #[test]
    fn malformed_documents_degrade_to_empty() {
        let json = ChainDataJson::from_value(serde_json::json!({ "transactions": 42 }));
        assert_eq!(json, ChainDataJson::default());
        let json = ChainDataJson::from_value(serde_json::json!({}));
        assert_eq!(json, ChainDataJson::default());
        assert!(ChainDataJson::load(serde_json::json!({ "calls": "nope" })).is_err());
    }

    #[test]
    fn only_invalid_records_are_dropped() {
        let good = sample_tx('a');
        let mut bad = sample_tx('b');
        bad.logs.push(EvmTransactionLog {
            address: "0x2222222222222222222222222222222222222222".into(),
            data: "0x".into(),
            index: 0,
            topics: vec!["0xzz".into()],
        });
        let mut bad_call = call('c', "1");
        bad_call.to = "nowhere".into();

        let mut json = ChainDataJson::default();
        json.record_history("0x1", &[good.hash.clone(), bad.hash.clone()]);
        json.transactions.insert(good.hash.clone(), good.clone());
        json.transactions.insert(bad.hash.clone(), bad.clone());
        json.calls = vec![call('a', "1"), bad_call];
        assert!(get_chain_data_error(&json).is_some());

        let value = serde_json::to_value(&json).unwrap();
        let loaded = ChainDataJson::load(value.clone()).unwrap();
        assert_eq!(loaded.history("0x1").len(), 2);
        assert_eq!(loaded.transactions.len(), 1);
        assert!(loaded.has_valid_transaction(&good.hash));
        assert_eq!(loaded.calls, vec![call('a', "1")]);
        assert_eq!(loaded.missing_transactions(), vec![bad.hash.clone()]);
        assert_eq!(get_chain_data_error(&loaded), None);

        assert_eq!(ChainDataJson::from_value(value), loaded);
    }
}
