/// RPC Client Module
///
/// This module handles all interactions with the EVM chain via JSON-RPC.
/// `ChainClient` is the seam the collectors are written against; `EvmRpcClient`
/// implements it over plain HTTP so any standard node or provider endpoint works.
use crate::models::{Block, ChainTransaction};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("RPC transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Failed to decode RPC response for {method}: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl RpcError {
    /// Check if this error is likely transient and worth retrying on the next cycle
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.as_u16() == 429 || s.is_server_error())
            }
            // -32005 is the de-facto "limit exceeded" code used by hosted providers
            RpcError::Rpc { code, message } => {
                *code == -32005 || message.to_lowercase().contains("rate limit")
            }
            RpcError::Decode { .. } | RpcError::InvalidUrl(_) => false,
        }
    }
}

/// The chain operations the collectors need
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Height of the latest block
    async fn current_tip_height(&self) -> Result<u64, RpcError>;

    /// Fetch a block by number; `Ok(None)` when the node does not know the block
    async fn get_block(&self, number: u64, include_transactions: bool) -> Result<Option<Block>, RpcError>;

    /// Fetch a transaction by hash; `Ok(None)` when the node does not know the hash
    async fn get_transaction(&self, hash: &str) -> Result<Option<ChainTransaction>, RpcError>;
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

pub struct EvmRpcClient {
    http: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl EvmRpcClient {
    /// Create a new RPC client for the specified endpoint
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, RpcError> {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(RpcError::InvalidUrl(endpoint));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { http, endpoint, next_id: AtomicU64::new(1) })
    }

    /// Get the endpoint URL this client talks to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });

        tracing::debug!("RPC {} (id {})", method, id);

        let response: JsonRpcResponse =
            self.http.post(&self.endpoint).json(&body).send().await?.error_for_status()?.json().await?;

        if let Some(error) = response.error {
            return Err(RpcError::Rpc { code: error.code, message: error.message });
        }

        let result = response.result.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(result).map_err(|source| RpcError::Decode { method, source })
    }
}

#[async_trait]
impl ChainClient for EvmRpcClient {
    async fn current_tip_height(&self) -> Result<u64, RpcError> {
        let raw: String = self.call("eth_blockNumber", serde_json::json!([])).await?;

        crate::models::parse_quantity(&raw).ok_or_else(|| RpcError::Decode {
            method: "eth_blockNumber",
            source: serde::de::Error::custom(format!("invalid hex quantity: {raw}")),
        })
    }

    async fn get_block(&self, number: u64, include_transactions: bool) -> Result<Option<Block>, RpcError> {
        self.call("eth_getBlockByNumber", serde_json::json!([format!("0x{number:x}"), include_transactions])).await
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<ChainTransaction>, RpcError> {
        self.call("eth_getTransactionByHash", serde_json::json!([hash])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_endpoint() {
        let result = EvmRpcClient::new("wss://node.example".to_string(), Duration::from_secs(1));
        assert!(matches!(result, Err(RpcError::InvalidUrl(_))));
    }

    #[test]
    fn test_accepts_http_endpoint() {
        let client = EvmRpcClient::new("https://node.example".to_string(), Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint(), "https://node.example");
    }

    #[test]
    fn test_rate_limit_errors_are_retryable() {
        let limited = RpcError::Rpc { code: -32005, message: "limit exceeded".to_string() };
        assert!(limited.is_retryable());

        let reverted = RpcError::Rpc { code: -32000, message: "execution reverted".to_string() };
        assert!(!reverted.is_retryable());

        assert!(!RpcError::InvalidUrl("x".to_string()).is_retryable());
    }

    #[test]
    fn test_null_result_decodes_to_none() {
        let response: JsonRpcResponse = serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        let result = response.result.unwrap_or(serde_json::Value::Null);
        let block: Option<Block> = serde_json::from_value(result).unwrap();
        assert!(block.is_none());
    }

    #[test]
    fn test_error_object_decodes() {
        let response: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"invalid argument"}}"#)
                .unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, -32602);
        assert_eq!(error.message, "invalid argument");
    }
}
