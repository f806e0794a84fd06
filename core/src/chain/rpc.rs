//! # JSON-RPC Transport
//!
//! Request/response envelopes for JSON-RPC 2.0 and a small HTTP transport
//! that speaks it to a Solana RPC node.
//!
//! ## Method Index
//!
//! | Method                               | Used for                          |
//! |--------------------------------------|-----------------------------------|
//! | `getBalance`                         | SOL balance lookups               |
//! | `requestAirdrop`                     | Devnet faucet                     |
//! | `getSignatureStatuses`               | Confirmation polling              |
//! | `getLatestBlockhash`                 | Transaction lifetime              |
//! | `getMinimumBalanceForRentExemption`  | Funding the mint account          |
//! | `getAccountInfo`                     | Does the token account exist yet? |
//! | `sendTransaction`                    | Everything that mutates           |
//!
//! Throttling is reported two ways in the wild: an HTTP 429 from whatever
//! sits in front of the node, or a JSON-RPC error whose message talks about
//! rate or airdrop limits. Both become [`ForgeError::RateLimited`].

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::error::{ForgeError, ForgeResult};

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Always "2.0".
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response. Exactly one of `result` or `error` is set by a
/// conforming node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    /// Whether this error is the node (or its faucet) telling us to back off.
    pub fn is_rate_limit(&self) -> bool {
        if self.code == 429 {
            return true;
        }
        let message = self.message.to_ascii_lowercase();
        ["rate limit", "too many requests", "airdrop limit", "faucet has run dry"]
            .iter()
            .any(|needle| message.contains(needle))
    }

    fn into_forge_error(self, method: &str) -> ForgeError {
        if self.is_rate_limit() {
            ForgeError::RateLimited(format!("{method}: {}", self.message))
        } else {
            ForgeError::Network(format!("{method} failed ({}): {}", self.code, self.message))
        }
    }
}

/// Many Solana results arrive wrapped as `{ "context": {...}, "value": T }`.
#[derive(Debug, Clone, Deserialize)]
pub struct WithContext<T> {
    pub value: T,
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Sends JSON-RPC calls to one endpoint.
#[derive(Debug)]
pub struct RpcTransport {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcTransport {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method` and deserialize its `result`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> ForgeResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);
        debug!(method, id, url = %self.url, "rpc call");

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ForgeError::Network(format!("{method}: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(method, url = %self.url, "rpc endpoint returned 429");
            return Err(ForgeError::RateLimited(format!("{method}: HTTP 429 from {}", self.url)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ForgeError::Network(format!("{method}: HTTP {status}: {}", body.trim())));
        }

        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|e| ForgeError::Network(format!("{method}: unreadable response: {e}")))?;
        decode_result(method, envelope)
    }
}

/// Pull the typed result out of a response envelope.
pub fn decode_result<T: DeserializeOwned>(method: &str, envelope: RpcResponse) -> ForgeResult<T> {
    if let Some(error) = envelope.error {
        return Err(error.into_forge_error(method));
    }
    let result = envelope
        .result
        .ok_or_else(|| ForgeError::Network(format!("{method}: response has neither result nor error")))?;
    serde_json::from_value(result)
        .map_err(|e| ForgeError::Network(format!("{method}: malformed result: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: serde_json::Value) -> RpcResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn request_serialization() {
        let req = RpcRequest::new(7, "getBalance", json!(["11111111111111111111111111111111"]));
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 7);
        assert_eq!(value["method"], "getBalance");
        assert_eq!(value["params"][0], "11111111111111111111111111111111");
    }

    #[test]
    fn decodes_context_wrapped_result() {
        let resp = envelope(json!({
            "jsonrpc": "2.0", "id": 1,
            "result": { "context": { "slot": 300 }, "value": 2_000_000_000u64 }
        }));
        let balance: WithContext<u64> = decode_result("getBalance", resp).unwrap();
        assert_eq!(balance.value, 2_000_000_000);
    }

    #[test]
    fn airdrop_limit_message_is_rate_limited() {
        let resp = envelope(json!({
            "jsonrpc": "2.0", "id": 1,
            "error": {
                "code": -32603,
                "message": "Internal error: airdrop limit reached for this address"
            }
        }));
        let err = decode_result::<String>("requestAirdrop", resp).unwrap_err();
        assert!(matches!(err, ForgeError::RateLimited(_)));
    }

    #[test]
    fn http_style_429_code_is_rate_limited() {
        let err = RpcError {
            code: 429,
            message: "slow down".into(),
            data: None,
        };
        assert!(err.is_rate_limit());
    }

    #[test]
    fn other_errors_are_network_errors() {
        let resp = envelope(json!({
            "jsonrpc": "2.0", "id": 1,
            "error": { "code": -32602, "message": "Invalid param: WrongSize" }
        }));
        let err = decode_result::<u64>("getBalance", resp).unwrap_err();
        match err {
            ForgeError::Network(msg) => assert!(msg.contains("WrongSize")),
            other => panic!("expected network error, got {other:?}"),
        }
    }

    #[test]
    fn empty_envelope_is_an_error() {
        let resp = envelope(json!({ "jsonrpc": "2.0", "id": 1 }));
        assert!(decode_result::<u64>("getBalance", resp).is_err());
    }

    #[test]
    fn ids_increase() {
        let transport = RpcTransport::new(reqwest::Client::new(), "http://127.0.0.1:8899");
        let a = transport.next_id.fetch_add(1, Ordering::Relaxed);
        let b = transport.next_id.fetch_add(1, Ordering::Relaxed);
        assert!(b > a);
        assert_eq!(transport.url(), "http://127.0.0.1:8899");
    }
}
