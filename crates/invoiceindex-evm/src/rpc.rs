//! HTTP JSON-RPC log source backed by `reqwest`.
//!
//! Transport failures (connection errors, HTTP 5xx/429, unparseable bodies)
//! are retried with exponential backoff. JSON-RPC error objects are returned
//! to the caller as-is: the node understood the request and refused it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use invoiceindex_core::error::IndexerError;
use invoiceindex_core::types::{parse_hex_u64, to_hex_quantity, LogFilter, RawLog};

use crate::fetcher::LogSource;

// ─── Wire types ───────────────────────────────────────────────────────────────

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ─── Retry policy ─────────────────────────────────────────────────────────────

/// Configuration for transport retries.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    /// Caps exponential growth.
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

/// Exponential backoff, stateless.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before the `attempt`-th retry (1-based), or `None` once retries
    /// are exhausted.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt > self.config.max_retries {
            return None;
        }
        let base_ms = self.config.initial_backoff.as_millis() as f64
            * self.config.multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped = base_ms.min(self.config.max_backoff.as_millis() as f64);
        Some(Duration::from_millis(capped as u64))
    }
}

// ─── HTTP client ──────────────────────────────────────────────────────────────

/// Configuration for [`HttpLogSource`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

enum SendError {
    /// Worth retrying.
    Transport(String),
    /// The node answered with an error object.
    Rpc(JsonRpcError),
}

/// [`LogSource`] over an HTTP JSON-RPC endpoint.
pub struct HttpLogSource {
    url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl HttpLogSource {
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, IndexerError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| IndexerError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
            retry: RetryPolicy::new(config.retry),
            next_id: AtomicU64::new(1),
        })
    }

    /// Create with default configuration.
    pub fn default_for(url: impl Into<String>) -> Result<Self, IndexerError> {
        Self::new(url, HttpClientConfig::default())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> Result<Value, SendError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SendError::Transport(format!("HTTP {status}: {body}")));
        }

        let body = resp
            .json::<JsonRpcResponse>()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;
        body.into_result().map_err(SendError::Rpc)
    }

    /// Send one request, retrying transport failures.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, IndexerError> {
        let req = JsonRpcRequest::new(self.next_id.fetch_add(1, Ordering::Relaxed), method, params);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(&req).await {
                Ok(value) => return Ok(value),
                Err(SendError::Rpc(err)) => {
                    return Err(IndexerError::Rpc(format!("{method}: {err}")));
                }
                Err(SendError::Transport(e)) => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            method,
                            "retrying request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(attempt, error = %e, method, "max retries exceeded");
                        return Err(IndexerError::Rpc(format!("{method}: {e}")));
                    }
                },
            }
        }
    }
}

#[async_trait]
impl LogSource for HttpLogSource {
    async fn get_block_number(&self) -> Result<u64, IndexerError> {
        let result = self.call("eth_blockNumber", vec![]).await?;
        result
            .as_str()
            .and_then(parse_hex_u64)
            .ok_or_else(|| IndexerError::Rpc(format!("eth_blockNumber: unexpected result {result}")))
    }

    async fn get_logs(&self, filter: &LogFilter, from: u64, to: u64) -> Result<Vec<RawLog>, IndexerError> {
        let params = json!({
            "address": filter.address,
            "fromBlock": to_hex_quantity(from),
            "toBlock": to_hex_quantity(to),
            "topics": [filter.topic0],
        });
        let result = self.call("eth_getLogs", vec![params]).await?;
        serde_json::from_value(result)
            .map_err(|e| IndexerError::Rpc(format!("eth_getLogs: malformed logs: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn fast_config(max_retries: u32) -> HttpClientConfig {
        HttpClientConfig {
            retry: RetryConfig {
                max_retries,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
                multiplier: 2.0,
            },
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::new(RetryConfig {
            max_retries: 4,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(300),
            multiplier: 2.0,
        });
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(3), Some(Duration::from_millis(300)));
        assert_eq!(policy.next_delay(5), None);
    }

    #[tokio::test]
    async fn block_number_parses_hex() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "eth_blockNumber" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x89" }).to_string())
            .create_async()
            .await;

        let source = HttpLogSource::new(server.url(), fast_config(0)).unwrap();
        assert_eq!(source.get_block_number().await.unwrap(), 137);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_logs_sends_hex_range_and_parses_logs() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "method": "eth_getLogs",
                "params": [{
                    "address": "0xrouter",
                    "fromBlock": "0x64",
                    "toBlock": "0x6d",
                    "topics": ["0xtopic"]
                }]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": [{
                        "address": "0xrouter",
                        "topics": ["0xtopic"],
                        "data": "0x",
                        "blockNumber": "0x69",
                        "transactionHash": "0xabc",
                        "logIndex": "0x3",
                        "blockHash": "0xdef",
                        "removed": false
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let source = HttpLogSource::new(server.url(), fast_config(0)).unwrap();
        let logs = source
            .get_logs(&LogFilter::new("0xrouter", "0xtopic"), 100, 109)
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].block_number, 105);
        assert_eq!(logs[0].log_index, 3);
        assert!(!logs[0].is_removed());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn transport_errors_are_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let source = HttpLogSource::new(server.url(), fast_config(2)).unwrap();
        let err = source.get_block_number().await.unwrap_err();
        assert!(matches!(err, IndexerError::Rpc(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rpc_errors_are_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": { "code": -32005, "message": "query returned more than 10000 results" }
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let source = HttpLogSource::new(server.url(), fast_config(3)).unwrap();
        let err = source
            .get_logs(&LogFilter::new("0xrouter", "0xtopic"), 1, 2)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("-32005"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn malformed_log_quantities_fail_the_fetch() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": [{
                        "address": "0xrouter",
                        "topics": [],
                        "data": "0x",
                        "blockNumber": "pending",
                        "transactionHash": "0xabc",
                        "logIndex": "0x0"
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let source = HttpLogSource::new(server.url(), fast_config(0)).unwrap();
        assert!(source
            .get_logs(&LogFilter::new("0xrouter", "0xtopic"), 1, 2)
            .await
            .is_err());
    }
}
