//! Block-explorer fetcher for Etherscan and its Polygonscan twin.
//!
//! History comes from the four `account` listings (normal, internal, ERC20
//! and NFT transfers). Detail comes from the `proxy` module's JSON-RPC
//! passthrough plus `txlistinternal` by hash. Listings carry block
//! timestamps, which are cached so detail lookups rarely need a block fetch.

use async_trait::async_trait;
use chainledger_core::amount::Amount;
use chainledger_core::evm::{EvmMetadata, EvmTransaction, EvmTransfer};
use serde_json::Value;

use crate::error::{ConfigError, FetchError};
use crate::fetcher::{FetchedHistory, Fetcher};
use crate::http::{HttpClient, HttpConfig};
use crate::rpc::{self, BlockTimes, RpcBlock, RpcReceipt, RpcTransaction};

const PROVIDER: &str = "etherscan";

const HISTORY_ACTIONS: &[&str] = &["txlist", "txlistinternal", "tokentx", "tokennfttx"];

/// API endpoint for a chain id.
pub fn api_url(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("https://api.etherscan.io/api"),
        137 => Some("https://api.polygonscan.com/api"),
        _ => None,
    }
}

/// Unwrap an Etherscan envelope: `{status, message, result}` for account
/// queries, a JSON-RPC object for proxy queries.
fn check(body: Value) -> Result<Value, FetchError> {
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(FetchError::Provider {
            provider: PROVIDER.to_string(),
            message,
        });
    }
    match body.get("result") {
        Some(Value::String(message)) if body.get("status").and_then(Value::as_str) == Some("0") => {
            let lower = message.to_lowercase();
            if lower.contains("rate limit") {
                Err(FetchError::RateLimited {
                    provider: PROVIDER.to_string(),
                })
            } else {
                Err(FetchError::Provider {
                    provider: PROVIDER.to_string(),
                    message: message.clone(),
                })
            }
        }
        Some(result) => Ok(result.clone()),
        None => Err(FetchError::malformed("etherscan response without a result")),
    }
}

fn text<'a>(item: &'a Value, key: &str) -> &'a str {
    item.get(key).and_then(Value::as_str).unwrap_or_default()
}

pub struct EtherscanFetcher {
    client: HttpClient,
    base_url: String,
    api_key: String,
    block_times: BlockTimes,
}

impl EtherscanFetcher {
    pub fn new(api_key: &str, meta: &EvmMetadata, config: HttpConfig) -> Result<Self, ConfigError> {
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey {
                provider: PROVIDER.to_string(),
            });
        }
        let base_url = api_url(meta.id).ok_or_else(|| ConfigError::UnsupportedChain {
            provider: PROVIDER.to_string(),
            chain: meta.name.clone(),
        })?;
        Ok(Self::with_base_url(api_key, base_url, HttpClient::new(PROVIDER, config)?))
    }

    /// Point at a custom endpoint (another explorer, a local mock).
    pub fn with_base_url(api_key: &str, base_url: &str, client: HttpClient) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            block_times: BlockTimes::default(),
        }
    }

    async fn query(&self, module: &str, action: &str, params: &[(&str, &str)]) -> Result<Value, FetchError> {
        let mut query: Vec<(&str, &str)> = vec![("module", module), ("action", action)];
        query.extend_from_slice(params);
        if module == "account" {
            query.push(("sort", "asc"));
        }
        query.push(("apikey", self.api_key.as_str()));
        tracing::debug!(module, action, "etherscan query");
        self.client.get(&self.base_url, &query, check).await
    }

    async fn listing(&self, action: &str, address: &str) -> Result<Vec<Value>, FetchError> {
        let result = self
            .query("account", action, &[("address", address), ("startblock", "0"), ("endblock", "99999999")])
            .await?;
        match result {
            Value::Array(items) => Ok(items),
            other => Err(FetchError::malformed(format!("{action} returned {other}"))),
        }
    }

    fn remember_block_time(&self, item: &Value) {
        let (block, at) = (text(item, "blockNumber"), text(item, "timeStamp"));
        if let (Ok(block), Ok(at)) = (rpc::quantity_u64(block), rpc::unix_time(at)) {
            self.block_times.insert(block, at);
        }
    }

    /// An internal-call listing item. `hash` is absent when listing by hash.
    fn internal_call(&self, item: &Value, hash: &str, target: Option<&str>) -> Result<Option<EvmTransfer>, FetchError> {
        if text(item, "isError") == "1" {
            return Ok(None);
        }
        let value = rpc::wei_to_ether(text(item, "value"))?;
        if Amount::parse_or_zero(&value).is_zero() {
            return Ok(None);
        }
        let from = text(item, "from");
        // contract creation: the created contract is the recipient
        let to = match (text(item, "to"), text(item, "contractAddress")) {
            ("", "") => match target {
                Some(address) if !address.eq_ignore_ascii_case(from) => address,
                _ => return Ok(None),
            },
            ("", created) => created,
            (to, _) => to,
        };
        Ok(Some(EvmTransfer {
            block: rpc::quantity_u64(text(item, "blockNumber"))?,
            from: rpc::checksum(from),
            hash: hash.to_lowercase(),
            timestamp: rpc::unix_time(text(item, "timeStamp"))?,
            to: rpc::checksum(to),
            value,
        }))
    }

    async fn block_time(&self, block: u64) -> Result<chrono::DateTime<chrono::Utc>, FetchError> {
        if let Some(at) = self.block_times.get(block) {
            return Ok(at);
        }
        let tag = format!("{block:#x}");
        let value = self
            .query("proxy", "eth_getBlockByNumber", &[("tag", tag.as_str()), ("boolean", "false")])
            .await?;
        let header: RpcBlock = serde_json::from_value(value)?;
        let at = rpc::unix_time(&header.timestamp)?;
        self.block_times.insert(block, at);
        Ok(at)
    }
}

#[async_trait]
impl Fetcher for EtherscanFetcher {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn fetch_history(&self, address: &str) -> Result<FetchedHistory, FetchError> {
        let mut hashes = Vec::new();
        let mut calls = Vec::new();
        for action in HISTORY_ACTIONS {
            let items = self.listing(action, address).await?;
            tracing::debug!(%address, action, count = items.len(), "etherscan history");
            for item in &items {
                self.remember_block_time(item);
                let hash = text(item, "hash");
                if hash.is_empty() {
                    continue;
                }
                hashes.push(hash.to_string());
                if *action == "txlistinternal" {
                    match self.internal_call(item, hash, Some(address)) {
                        Ok(Some(call)) => calls.push(call),
                        Ok(None) => {}
                        Err(e) => tracing::warn!(%hash, error = %e, "skipping malformed internal call"),
                    }
                }
            }
        }
        Ok(FetchedHistory::new(hashes, calls))
    }

    async fn fetch_transaction(&self, hash: &str) -> Result<EvmTransaction, FetchError> {
        let tx = self.query("proxy", "eth_getTransactionByHash", &[("txhash", hash)]).await?;
        if tx.is_null() {
            return Err(FetchError::NotFound { hash: hash.to_string() });
        }
        let tx: RpcTransaction = serde_json::from_value(tx)?;

        let receipt = self.query("proxy", "eth_getTransactionReceipt", &[("txhash", hash)]).await?;
        if receipt.is_null() {
            // pending
            return Err(FetchError::NotFound { hash: hash.to_string() });
        }
        let receipt: RpcReceipt = serde_json::from_value(receipt)?;

        let internal = match self.query("account", "txlistinternal", &[("txhash", hash)]).await? {
            Value::Array(items) => items,
            other => return Err(FetchError::malformed(format!("txlistinternal returned {other}"))),
        };
        let calls = internal
            .iter()
            .map(|item| self.internal_call(item, hash, None))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();

        let block = rpc::quantity_u64(&receipt.block_number)?;
        let timestamp = self.block_time(block).await?;
        rpc::assemble(tx, receipt, timestamp, calls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelopes() {
        let ok = json!({ "status": "1", "message": "OK", "result": [{ "hash": "0x1" }] });
        assert!(check(ok).unwrap().is_array());

        let empty = json!({ "status": "0", "message": "No transactions found", "result": [] });
        assert_eq!(check(empty).unwrap(), json!([]));

        let limited = json!({ "status": "0", "message": "NOTOK", "result": "Max rate limit reached" });
        assert!(check(limited).unwrap_err().is_rate_limit());

        let bad_key = json!({ "status": "0", "message": "NOTOK", "result": "Invalid API Key" });
        assert!(matches!(check(bad_key), Err(FetchError::Provider { .. })));

        let proxy = json!({ "jsonrpc": "2.0", "id": 1, "result": null });
        assert!(check(proxy).unwrap().is_null());
    }

    #[test]
    fn known_chains() {
        assert_eq!(api_url(1), Some("https://api.etherscan.io/api"));
        assert!(api_url(137).is_some());
        assert!(api_url(5).is_none());
    }

    #[test]
    fn empty_key_is_a_config_error() {
        let result = EtherscanFetcher::new(" ", &EvmMetadata::ethereum(), HttpConfig::default());
        assert!(matches!(result, Err(ConfigError::MissingApiKey { .. })));
    }

    #[test]
    fn internal_calls_from_listings() {
        let fetcher = EtherscanFetcher::new("key", &EvmMetadata::ethereum(), HttpConfig::default()).unwrap();
        let me = "0x1111111111111111111111111111111111111111";
        let hash = format!("0x{}", "ab".repeat(32));
        let item = json!({
            "blockNumber": "12000000", "timeStamp": "1614600000", "hash": hash,
            "from": "0x2222222222222222222222222222222222222222", "to": "",
            "contractAddress": "", "value": "500000000000000000", "isError": "0"
        });
        let call = fetcher.internal_call(&item, &hash, Some(me)).unwrap().unwrap();
        assert_eq!(call.to, me);
        assert_eq!(call.value, "0.5");

        let failed = json!({ "blockNumber": "1", "timeStamp": "1", "from": me, "to": me, "value": "1", "isError": "1" });
        assert_eq!(fetcher.internal_call(&failed, &hash, None).unwrap(), None);
    }
}
