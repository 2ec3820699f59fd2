// ============================================================================
// JSON-RPC 2.0 transport
// ============================================================================
//
// Thin reqwest wrapper shared by the base-chain and rollup clients. One POST
// per call, no retries; transport, protocol and decoding failures map onto
// ProviderError.
//
// ============================================================================

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::ProviderError;

#[derive(Debug, Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcResponse {
    #[serde(default)]
    pub result: serde_json::Value,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

/// JSON-RPC client bound to one endpoint
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    endpoint: String,
    client: Client,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(JsonRpcClient {
            endpoint: endpoint.to_string(),
            client,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R, ProviderError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        debug!(endpoint = %self.endpoint, method, id, "rpc call");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Transport(format!("HTTP {}: {}", status, body)));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        decode_response(body)
    }
}

pub(crate) fn decode_response<R: DeserializeOwned>(body: RpcResponse) -> Result<R, ProviderError> {
    if let Some(error) = body.error {
        return Err(ProviderError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    serde_json::from_value(body.result).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

// ============================================================================
// NUMBER ENCODINGS
// ============================================================================

/// `0x`-prefixed hex quantity (Ethereum JSON-RPC)
pub(crate) fn parse_hex_quantity(raw: &str) -> Result<u128, ProviderError> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| ProviderError::InvalidResponse(format!("not a hex quantity: {}", raw)))?;
    if digits.is_empty() {
        return Err(ProviderError::InvalidResponse("empty hex quantity".into()));
    }
    u128::from_str_radix(digits, 16).map_err(|e| ProviderError::InvalidResponse(format!("{}: {}", raw, e)))
}

/// Base-10 integer carried as a string (rollup JSON-RPC)
pub(crate) fn parse_decimal_string(raw: &str) -> Result<u128, ProviderError> {
    raw.trim()
        .parse::<u128>()
        .map_err(|e| ProviderError::InvalidResponse(format!("{}: {}", raw, e)))
}
