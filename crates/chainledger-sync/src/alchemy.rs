//! JSON-RPC fetcher for Alchemy (or any node exposing
//! `alchemy_getAssetTransfers` and parity-style `trace_transaction`).

use async_trait::async_trait;
use chainledger_core::evm::EvmTransaction;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ConfigError, FetchError};
use crate::fetcher::{FetchedHistory, Fetcher};
use crate::http::{HttpClient, HttpConfig};
use crate::rpc::{self, BlockTimes, RpcBlock, RpcReceipt, RpcTrace, RpcTransaction};

const PROVIDER: &str = "alchemy";

const TRANSFER_CATEGORIES: &[&str] = &["external", "internal", "erc20", "erc721", "erc1155"];

/// JSON-RPC error code some nodes use for throttling.
const LIMIT_EXCEEDED: i64 = -32005;

fn check(body: Value) -> Result<Value, FetchError> {
    if let Some(error) = body.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        if code == 429 || code == LIMIT_EXCEEDED || message.to_lowercase().contains("rate limit") {
            return Err(FetchError::RateLimited {
                provider: PROVIDER.to_string(),
            });
        }
        return Err(FetchError::Provider {
            provider: PROVIDER.to_string(),
            message,
        });
    }
    body.get("result")
        .cloned()
        .ok_or_else(|| FetchError::malformed("json-rpc response without a result"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferPage {
    #[serde(default)]
    transfers: Vec<AssetTransfer>,
    page_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssetTransfer {
    hash: Option<String>,
}

pub struct AlchemyFetcher {
    client: HttpClient,
    url: String,
    block_times: BlockTimes,
}

impl AlchemyFetcher {
    pub fn new(url: &str, config: HttpConfig) -> Result<Self, ConfigError> {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigError::InvalidUrl {
                url: redact(url),
                reason: "expected an http(s) url".to_string(),
            });
        }
        Ok(Self {
            client: HttpClient::new(PROVIDER, config)?,
            url: url.to_string(),
            block_times: BlockTimes::default(),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, FetchError> {
        let body = json!({ "id": 1, "jsonrpc": "2.0", "method": method, "params": params });
        tracing::debug!(method, url = %redact(&self.url), "alchemy request");
        self.client.post(&self.url, &body, check).await
    }

    /// Every transfer page matching `filter` (`fromAddress` or `toAddress`).
    async fn transfers(&self, filter: (&str, &str)) -> Result<Vec<String>, FetchError> {
        let mut hashes = Vec::new();
        let mut page_key: Option<String> = None;
        loop {
            let mut params = json!({
                "fromBlock": "0x0",
                "toBlock": "latest",
                "category": TRANSFER_CATEGORIES,
                "excludeZeroValue": false,
                "maxCount": "0x3e8",
            });
            params[filter.0] = json!(filter.1);
            if let Some(key) = &page_key {
                params["pageKey"] = json!(key);
            }
            let page: TransferPage = serde_json::from_value(self.call("alchemy_getAssetTransfers", json!([params])).await?)?;
            hashes.extend(page.transfers.into_iter().filter_map(|t| t.hash));
            match page.page_key {
                Some(key) => {
                    tracing::debug!(address = filter.1, page_key = %key, "fetching next transfer page");
                    page_key = Some(key);
                }
                None => return Ok(hashes),
            }
        }
    }

    async fn block_time(&self, block: u64) -> Result<chrono::DateTime<chrono::Utc>, FetchError> {
        if let Some(at) = self.block_times.get(block) {
            return Ok(at);
        }
        let header: RpcBlock =
            serde_json::from_value(self.call("eth_getBlockByNumber", json!([format!("{block:#x}"), false])).await?)?;
        let at = rpc::unix_time(&header.timestamp)?;
        self.block_times.insert(block, at);
        Ok(at)
    }
}

/// Drop the trailing API key path segment from a provider url.
fn redact(url: &str) -> String {
    match url.rsplit_once('/') {
        Some((base, key)) if key.len() > 16 => format!("{base}/***"),
        _ => url.to_string(),
    }
}

#[async_trait]
impl Fetcher for AlchemyFetcher {
    fn name(&self) -> &str {
        PROVIDER
    }

    // Asset transfers miss zero-value contract calls, so fee-only history
    // can be incomplete with this provider.
    async fn fetch_history(&self, address: &str) -> Result<FetchedHistory, FetchError> {
        let (incoming, outgoing) = futures::try_join!(
            self.transfers(("toAddress", address)),
            self.transfers(("fromAddress", address)),
        )?;
        tracing::debug!(%address, incoming = incoming.len(), outgoing = outgoing.len(), "alchemy history");
        Ok(FetchedHistory::new(incoming.into_iter().chain(outgoing).collect(), Vec::new()))
    }

    async fn fetch_transaction(&self, hash: &str) -> Result<EvmTransaction, FetchError> {
        let (tx, receipt, traces) = futures::try_join!(
            self.call("eth_getTransactionByHash", json!([hash])),
            self.call("eth_getTransactionReceipt", json!([hash])),
            self.call("trace_transaction", json!([hash])),
        )?;
        if tx.is_null() || receipt.is_null() {
            return Err(FetchError::NotFound { hash: hash.to_string() });
        }
        let tx: RpcTransaction = serde_json::from_value(tx)?;
        let receipt: RpcReceipt = serde_json::from_value(receipt)?;
        let traces: Vec<RpcTrace> = if traces.is_null() {
            Vec::new()
        } else {
            serde_json::from_value(traces)?
        };

        let block = rpc::quantity_u64(&receipt.block_number)?;
        let timestamp = self.block_time(block).await?;
        let calls = rpc::trace_calls(hash, block, timestamp, &traces)?;
        rpc::assemble(tx, receipt, timestamp, calls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_errors() {
        let limited = json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": 429, "message": "Too many requests" } });
        assert!(check(limited).unwrap_err().is_rate_limit());

        let failed = json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32602, "message": "invalid params" } });
        assert!(matches!(check(failed), Err(FetchError::Provider { .. })));

        let ok = json!({ "jsonrpc": "2.0", "id": 1, "result": { "transfers": [], "pageKey": null } });
        let page: TransferPage = serde_json::from_value(check(ok).unwrap()).unwrap();
        assert!(page.transfers.is_empty());
        assert!(page.page_key.is_none());
    }

    #[test]
    fn url_validation_and_redaction() {
        assert!(matches!(
            AlchemyFetcher::new("eth-mainnet.g.alchemy.com/v2/key", HttpConfig::default()),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(AlchemyFetcher::new("https://eth-mainnet.g.alchemy.com/v2/abc", HttpConfig::default()).is_ok());
        assert_eq!(
            redact("https://eth-mainnet.g.alchemy.com/v2/0123456789abcdef0123"),
            "https://eth-mainnet.g.alchemy.com/v2/***"
        );
    }
}
