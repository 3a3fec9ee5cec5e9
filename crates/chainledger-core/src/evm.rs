//! Raw EVM chain records as fetched from a data provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::is_address;
use crate::amount::{parse_quantity, Amount};

/// Static description of an EVM chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmMetadata {
    pub id: u64,
    pub name: String,
    pub fee_asset: String,
}

impl EvmMetadata {
    pub fn ethereum() -> Self {
        Self {
            id: 1,
            name: "Ethereum".to_string(),
            fee_asset: "ETH".to_string(),
        }
    }

    pub fn polygon() -> Self {
        Self {
            id: 137,
            name: "Polygon".to_string(),
            fee_asset: "MATIC".to_string(),
        }
    }
}

/// An emitted event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmTransactionLog {
    pub address: String,
    pub data: String,
    pub index: u64,
    pub topics: Vec<String>,
}

/// An internal value transfer (a call carrying native value).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmTransfer {
    pub block: u64,
    pub from: String,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub to: String,
    /// Decimal native-asset amount.
    pub value: String,
}

impl EvmTransfer {
    /// Calls are identical when hash, endpoints and value match.
    pub fn same_call(&self, other: &EvmTransfer) -> bool {
        self.hash.eq_ignore_ascii_case(&other.hash)
            && self.from.eq_ignore_ascii_case(&other.from)
            && self.to.eq_ignore_ascii_case(&other.to)
            && Amount::parse_or_zero(&self.value) == Amount::parse_or_zero(&other.value)
    }
}

/// A fully fetched transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmTransaction {
    pub hash: String,
    pub block: u64,
    pub timestamp: DateTime<Utc>,
    pub from: String,
    /// `None` for contract creation.
    pub to: Option<String>,
    /// Decimal native-asset amount.
    pub value: String,
    pub nonce: u64,
    /// Hex quantity.
    pub gas_price: String,
    /// Hex quantity.
    pub gas_used: String,
    /// Hex calldata.
    #[serde(default = "empty_hex")]
    pub data: String,
    /// Position of the transaction in its block.
    #[serde(default)]
    pub index: u64,
    /// 1 = success, 0 = reverted. Absent before Byzantium.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u8>,
    pub logs: Vec<EvmTransactionLog>,
    /// Internal value transfers belonging to this transaction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transfers: Vec<EvmTransfer>,
}

fn empty_hex() -> String {
    "0x".to_string()
}

impl EvmTransaction {
    pub fn succeeded(&self) -> bool {
        self.status != Some(0)
    }

    /// 4-byte function selector of the calldata, if any.
    pub fn selector(&self) -> Option<&str> {
        if self.data.len() >= 10 {
            self.data.get(..10)
        } else {
            None
        }
    }
}

// ─── Validators ──────────────────────────────────────────────────────────────

/// True for a `0x`-prefixed 32-byte hex string.
pub fn is_bytes32(s: &str) -> bool {
    is_hex_string(s) && s.len() == 66
}

/// True for a `0x`-prefixed even-length hex string.
pub fn is_hex_string(s: &str) -> bool {
    s.strip_prefix("0x")
        .map(|body| hex::decode(body).is_ok())
        .unwrap_or(false)
}

/// Structural check for one log. `None` means valid.
pub fn get_evm_log_error(log: &EvmTransactionLog) -> Option<String> {
    if !is_address(&log.address) {
        return Some(format!("Invalid log address {}", log.address));
    }
    if !is_hex_string(&log.data) {
        return Some(format!("Invalid data in log {}", log.index));
    }
    if let Some(topic) = log.topics.iter().find(|t| !is_bytes32(t)) {
        return Some(format!("Invalid topic {} in log {}", topic, log.index));
    }
    None
}

/// Structural check for one internal call. `None` means valid.
pub fn get_evm_transfer_error(call: &EvmTransfer) -> Option<String> {
    if !is_bytes32(&call.hash) {
        return Some(format!("Invalid call hash {}", call.hash));
    }
    if !is_address(&call.from) || !is_address(&call.to) {
        return Some(format!("Invalid call endpoints {} -> {}", call.from, call.to));
    }
    if Amount::parse(&call.value).is_err() {
        return Some(format!("Invalid call value {}", call.value));
    }
    None
}

/// Structural check for a fetched transaction. `None` means valid.
pub fn get_evm_transaction_error(tx: &EvmTransaction) -> Option<String> {
    if !is_bytes32(&tx.hash) {
        return Some(format!("Invalid hash {}", tx.hash));
    }
    if !is_address(&tx.from) {
        return Some(format!("Invalid sender {} in {}", tx.from, tx.hash));
    }
    if let Some(to) = &tx.to {
        if !is_address(to) {
            return Some(format!("Invalid recipient {} in {}", to, tx.hash));
        }
    }
    if Amount::parse(&tx.value).is_err() {
        return Some(format!("Invalid value {} in {}", tx.value, tx.hash));
    }
    if parse_quantity(&tx.gas_price).is_none() || parse_quantity(&tx.gas_used).is_none() {
        return Some(format!("Invalid gas fields in {}", tx.hash));
    }
    if let Some(status) = tx.status {
        if status > 1 {
            return Some(format!("Invalid status {} in {}", status, tx.hash));
        }
    }
    tx.logs
        .iter()
        .find_map(get_evm_log_error)
        .or_else(|| tx.transfers.iter().find_map(get_evm_transfer_error))
        .map(|e| format!("{}: {}", tx.hash, e))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn sample_tx(hash_byte: char) -> EvmTransaction {
        EvmTransaction {
            hash: format!("0x{}", hash_byte.to_string().repeat(64)),
            block: 12_000_000,
            timestamp: Utc.with_ymd_and_hms(2021, 3, 1, 12, 0, 0).unwrap(),
            from: "0x1111111111111111111111111111111111111111".into(),
            to: Some("0x2222222222222222222222222222222222222222".into()),
            value: "1.5".into(),
            nonce: 7,
            gas_price: "0x3b9aca00".into(),
            gas_used: "0x5208".into(),
            data: "0x".into(),
            index: 3,
            status: Some(1),
            logs: vec![],
            transfers: vec![],
        }
    }

    #[test]
    fn valid_transaction_passes() {
        assert_eq!(get_evm_transaction_error(&sample_tx('a')), None);
    }

    #[test]
    fn malformed_fields_are_reported() {
        let mut tx = sample_tx('a');
        tx.hash = "0x1234".into();
        assert!(get_evm_transaction_error(&tx).unwrap().contains("Invalid hash"));

        let mut tx = sample_tx('a');
        tx.gas_used = "lots".into();
        assert!(get_evm_transaction_error(&tx).is_some());

        let mut tx = sample_tx('a');
        tx.logs.push(EvmTransactionLog {
            address: "0x2222222222222222222222222222222222222222".into(),
            data: "0x".into(),
            index: 4,
            topics: vec!["0xdead".into()],
        });
        assert!(get_evm_transaction_error(&tx).unwrap().contains("Invalid topic"));
    }

    #[test]
    fn camel_case_wire_format() {
        let value = serde_json::to_value(sample_tx('b')).unwrap();
        assert_eq!(value["gasPrice"], "0x3b9aca00");
        assert_eq!(value["gasUsed"], "0x5208");
        assert!(value.get("transfers").is_none());
        let back: EvmTransaction = serde_json::from_value(value).unwrap();
        assert_eq!(back, sample_tx('b'));
    }

    #[test]
    fn call_identity_ignores_case_and_formatting() {
        let a = EvmTransfer {
            block: 1,
            from: "0xAAAAaaaaAAAAaaaaAAAAaaaaAAAAaaaaAAAAaaaa".into(),
            hash: format!("0x{}", "c".repeat(64)),
            timestamp: Utc.with_ymd_and_hms(2021, 3, 1, 12, 0, 0).unwrap(),
            to: "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".into(),
            value: "1.0".into(),
        };
        let mut b = a.clone();
        b.from = b.from.to_lowercase();
        b.value = "1".into();
        assert!(a.same_call(&b));
        b.value = "2".into();
        assert!(!a.same_call(&b));
    }
}
