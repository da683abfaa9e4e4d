// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP client for the ledger node RPC surface.
//!
//! Every method issues exactly one request and maps the outcome to a typed
//! result. There are no retries here; callers decide (the poller simply
//! waits for its next tick).

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::types::*;

/// Node URL used when none is configured.
pub const DEFAULT_RPC_URL: &str = "http://localhost:8080";

/// Per-request timeout used when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while talking to the node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("RPC call failed ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("Rate limited by node: {message}")]
    RateLimited { message: String },

    #[error("Node unreachable: {0}")]
    NetworkUnavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RpcError {
    /// HTTP status carried by the error, if the node answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            RpcError::Status { status, .. } => Some(*status),
            RpcError::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS.as_u16()),
            _ => None,
        }
    }
}

/// Ledger node client.
#[derive(Debug, Clone)]
pub struct NodeClient {
    /// Base URL without trailing slash
    base_url: String,
    http: Client,
}

impl NodeClient {
    /// Create a client for the node at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RpcError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url).map_err(|e| RpcError::InvalidRpcUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RpcError::InvalidRpcUrl(format!(
                "unsupported scheme `{}`",
                parsed.scheme()
            )));
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::NetworkUnavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { base_url, http })
    }

    /// Client for the default local node.
    pub fn local() -> Result<Self, RpcError> {
        Self::new(DEFAULT_RPC_URL, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Current balance of `address`.
    pub async fn get_balance(&self, address: &str) -> Result<u64, RpcError> {
        let mut url = self.endpoint("/balance")?;
        url.query_pairs_mut().append_pair("addr", address);
        let response: BalanceResponse = self.get_json(url).await?;
        Ok(response.balance)
    }

    /// Post a signed transaction to the mempool.
    pub async fn submit_transaction(
        &self,
        tx: &SignedTransaction,
    ) -> Result<SubmissionReceipt, RpcError> {
        let url = self.endpoint("/submitTx")?;
        self.post_json(url, &tx.to_record()).await
    }

    /// All blocks the node holds, in node order.
    pub async fn get_blocks(&self) -> Result<Vec<Block>, RpcError> {
        let url = self.endpoint("/blocks")?;
        let blocks: Option<Vec<Block>> = self.get_json(url).await?;
        Ok(blocks.unwrap_or_default())
    }

    /// Pending transactions.
    pub async fn get_mempool(&self) -> Result<Vec<MempoolEntry>, RpcError> {
        let url = self.endpoint("/mempool")?;
        let entries: Option<Vec<MempoolEntry>> = self.get_json(url).await?;
        Ok(entries.unwrap_or_default())
    }

    /// Ask the faucet to credit `address`.
    pub async fn request_faucet(&self, address: &str) -> Result<FaucetReceipt, RpcError> {
        let url = self.endpoint("/faucet")?;
        self.post_json(url, &json!({ "address": address })).await
    }

    /// Credit `amount` to `user_id` directly.
    pub async fn add_balance(&self, user_id: &str, amount: u64) -> Result<BalanceUpdate, RpcError> {
        let url = self.endpoint("/addBalance")?;
        self.post_json(url, &json!({ "userId": user_id, "amount": amount }))
            .await
    }

    /// Reset the balance of `address` to zero.
    pub async fn reset_balance(&self, address: &str) -> Result<BalanceUpdate, RpcError> {
        let url = self.endpoint("/api/resetBalance")?;
        self.post_json(url, &json!({ "address": address })).await
    }

    /// Liveness probe. Any 2xx is healthy; everything else, including an
    /// unreachable node, is not.
    pub async fn health(&self) -> bool {
        let Ok(url) = self.endpoint("/health") else {
            return false;
        };
        match self.http.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Health probe failed");
                false
            }
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, RpcError> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| RpcError::InvalidRpcUrl(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, RpcError> {
        let path = url.path().to_string();
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| map_transport_error("GET", &path, e))?;
        decode_json("GET", &path, response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T, RpcError> {
        let path = url.path().to_string();
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| map_transport_error("POST", &path, e))?;
        decode_json("POST", &path, response).await
    }
}

/// Check the status and decode a JSON body.
async fn decode_json<T: DeserializeOwned>(
    method: &str,
    path: &str,
    response: Response,
) -> Result<T, RpcError> {
    let status = response.status();
    debug!(method, path, status = status.as_u16(), "Node responded");

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(map_status(status, &body));
    }

    response
        .json()
        .await
        .map_err(|e| RpcError::InvalidResponse(format!("{method} {path} invalid JSON: {e}")))
}

/// Map a non-2xx status and its body to an error.
pub fn map_status(status: StatusCode, body: &str) -> RpcError {
    let message = extract_error_message(body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
    if status == StatusCode::TOO_MANY_REQUESTS {
        RpcError::RateLimited { message }
    } else {
        RpcError::Status {
            status: status.as_u16(),
            message,
        }
    }
}

/// Pull a readable message out of an error body: either `{"error": "..."}`
/// or plain text.
fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let from_json = serde_json::from_str::<Value>(trimmed)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string));
    Some(from_json.unwrap_or_else(|| trimmed.to_string()))
}

fn map_transport_error(method: &str, path: &str, e: reqwest::Error) -> RpcError {
    if e.is_timeout() {
        RpcError::NetworkUnavailable(format!("{method} {path} timed out"))
    } else if e.is_decode() {
        RpcError::InvalidResponse(format!("{method} {path}: {e}"))
    } else {
        RpcError::NetworkUnavailable(format!("{method} {path} failed: {e}"))
    }
}
