//! Ethereum JSON-RPC record shapes and their normalisation into
//! [`EvmTransaction`].
//!
//! Both providers return these objects: Alchemy natively, Etherscan through
//! its `proxy` module.

use alloy_primitives::U256;
use chainledger_core::account::normalize_address;
use chainledger_core::amount::{parse_quantity, Amount};
use chainledger_core::evm::{get_evm_transaction_error, EvmTransaction, EvmTransactionLog, EvmTransfer};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::FetchError;

/// Gas every plain value transfer uses.
const TRANSFER_GAS: u64 = 21_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: String,
    pub block_number: Option<String>,
    pub from: String,
    pub to: Option<String>,
    pub value: String,
    pub nonce: String,
    pub gas: Option<String>,
    pub gas_price: Option<String>,
    pub input: Option<String>,
    pub transaction_index: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    pub block_number: String,
    pub gas_used: String,
    pub effective_gas_price: Option<String>,
    /// Absent before Byzantium.
    pub status: Option<String>,
    #[serde(default)]
    pub logs: Vec<RpcLog>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    pub data: Option<String>,
    pub log_index: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcBlock {
    pub timestamp: String,
}

/// One entry of a parity-style `trace_transaction` result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTrace {
    pub action: TraceAction,
    #[serde(rename = "type")]
    pub kind: String,
    pub error: Option<String>,
    #[serde(default)]
    pub trace_address: Vec<u64>,
    pub result: Option<TraceResult>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceAction {
    pub from: Option<String>,
    pub to: Option<String>,
    pub value: Option<String>,
    pub call_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraceResult {
    /// Set for `create` traces.
    pub address: Option<String>,
}

// ─── Conversions ─────────────────────────────────────────────────────────────

/// Parse a hex (or decimal) quantity into a u64.
pub fn quantity_u64(raw: &str) -> Result<u64, FetchError> {
    parse_quantity(raw)
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| FetchError::malformed(format!("invalid quantity {raw}")))
}

/// Wei quantity (hex or decimal) to a decimal ETH string.
pub fn wei_to_ether(raw: &str) -> Result<String, FetchError> {
    let wei: U256 = parse_quantity(raw).ok_or_else(|| FetchError::malformed(format!("invalid wei value {raw}")))?;
    Ok(Amount::from_wei(wei).to_string())
}

/// Unix seconds (hex or decimal) to a UTC timestamp.
pub fn unix_time(raw: &str) -> Result<DateTime<Utc>, FetchError> {
    let secs = quantity_u64(raw)?;
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .ok_or_else(|| FetchError::malformed(format!("invalid timestamp {raw}")))
}

/// EIP-55 form of a provider address, verbatim if it is not one.
pub fn checksum(address: &str) -> String {
    normalize_address(address).unwrap_or_else(|_| address.to_string())
}

/// Receipt status, inferred for pre-Byzantium receipts: a transaction that
/// left gas unused, or a 21000-gas value transfer, succeeded.
fn status(tx: &RpcTransaction, receipt: &RpcReceipt) -> Result<Option<u8>, FetchError> {
    if let Some(raw) = &receipt.status {
        return Ok(Some(if quantity_u64(raw)? == 0 { 0 } else { 1 }));
    }
    let used = quantity_u64(&receipt.gas_used)?;
    let Some(limit) = tx.gas.as_deref().map(quantity_u64).transpose()? else {
        return Ok(None);
    };
    Ok(Some(if limit > used || limit == TRANSFER_GAS { 1 } else { 0 }))
}

/// Value-carrying internal calls from a transaction trace. The top-level
/// call is the transaction itself and is skipped, as are reverted branches.
pub fn trace_calls(
    hash: &str,
    block: u64,
    timestamp: DateTime<Utc>,
    traces: &[RpcTrace],
) -> Result<Vec<EvmTransfer>, FetchError> {
    let mut calls = Vec::new();
    for trace in traces {
        if trace.trace_address.is_empty() || trace.error.is_some() {
            continue;
        }
        let to = match trace.kind.as_str() {
            "call" if trace.action.call_type.as_deref().unwrap_or("call") == "call" => trace.action.to.clone(),
            "create" => trace.result.as_ref().and_then(|r| r.address.clone()),
            _ => None,
        };
        let (Some(from), Some(to), Some(value)) = (&trace.action.from, to, &trace.action.value) else {
            continue;
        };
        let value = wei_to_ether(value)?;
        if Amount::parse_or_zero(&value).is_zero() {
            continue;
        }
        calls.push(EvmTransfer {
            block,
            from: checksum(from),
            hash: hash.to_lowercase(),
            timestamp,
            to: checksum(&to),
            value,
        });
    }
    Ok(calls)
}

/// Assemble a validated [`EvmTransaction`] from its RPC parts.
pub fn assemble(
    tx: RpcTransaction,
    receipt: RpcReceipt,
    timestamp: DateTime<Utc>,
    calls: Vec<EvmTransfer>,
) -> Result<EvmTransaction, FetchError> {
    let status = status(&tx, &receipt)?;
    let logs = receipt
        .logs
        .iter()
        .map(|log| {
            Ok(EvmTransactionLog {
                address: checksum(&log.address),
                data: log.data.clone().unwrap_or_else(|| "0x".to_string()),
                index: quantity_u64(&log.log_index)?,
                topics: log.topics.iter().map(|t| t.to_lowercase()).collect(),
            })
        })
        .collect::<Result<Vec<_>, FetchError>>()?;

    let gas_price = receipt
        .effective_gas_price
        .clone()
        .or_else(|| tx.gas_price.clone())
        .ok_or_else(|| FetchError::malformed(format!("no gas price for {}", tx.hash)))?;

    let evm_tx = EvmTransaction {
        hash: tx.hash.to_lowercase(),
        block: quantity_u64(tx.block_number.as_deref().unwrap_or(&receipt.block_number))?,
        timestamp,
        from: checksum(&tx.from),
        to: tx.to.as_deref().filter(|to| !to.is_empty()).map(checksum),
        value: wei_to_ether(&tx.value)?,
        nonce: quantity_u64(&tx.nonce)?,
        gas_price,
        gas_used: receipt.gas_used.clone(),
        data: tx.input.clone().unwrap_or_else(|| "0x".to_string()),
        index: tx.transaction_index.as_deref().map(quantity_u64).transpose()?.unwrap_or(0),
        status,
        logs,
        transfers: calls,
    };
    match get_evm_transaction_error(&evm_tx) {
        None => Ok(evm_tx),
        Some(e) => Err(FetchError::Invalid(e)),
    }
}

// ─── Block timestamps ────────────────────────────────────────────────────────

/// Block number → timestamp cache. Transaction lookups by hash don't carry a
/// timestamp, history listings usually do.
#[derive(Debug, Default)]
pub struct BlockTimes {
    times: Mutex<HashMap<u64, DateTime<Utc>>>,
}

impl BlockTimes {
    pub fn get(&self, block: u64) -> Option<DateTime<Utc>> {
        self.times.lock().ok()?.get(&block).copied()
    }

    pub fn insert(&self, block: u64, at: DateTime<Utc>) {
        if let Ok(mut times) = self.times.lock() {
            times.insert(block, at);
        }
    }
}
