//! JSON-RPC channel to the Better BibTeX endpoint.
//!
//! [`RpcChannel`] is the only seam between this crate and the network. The
//! [`HttpRpcChannel`] talks to the running desktop application; [`MockChannel`]
//! serves canned responses for tests.

mod http;
pub mod mock;

pub use http::HttpRpcChannel;
pub use mock::MockChannel;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC methods consumed from the service
pub mod methods {
    /// All libraries; `params: [true]` includes collection trees
    pub const USER_GROUPS: &str = "user.groups";
    /// Export citation keys: `params: [keys, format, libraryId]`
    pub const ITEM_EXPORT: &str = "item.export";
    /// Attachments of one item: `params: [citekey]`
    pub const ITEM_ATTACHMENTS: &str = "item.attachments";
}

/// Request/response transport to the reference manager
#[async_trait]
pub trait RpcChannel: Send + Sync + std::fmt::Debug {
    /// POST a JSON-RPC request and return its `result`
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError>;

    /// GET a path relative to the service root and return the body
    async fn fetch(&self, path: &str) -> Result<String, RpcError>;
}

/// Transport-level failures, surfaced untouched to callers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// Nothing is listening (the desktop application is not running)
    #[error("service unreachable: {0}")]
    Unreachable(String),

    #[error("request timed out")]
    Timeout,

    /// Non-2xx HTTP status
    #[error("HTTP status {0}")]
    Status(u16),

    /// Body present but not a JSON-RPC response
    #[error("malformed response: {0}")]
    Malformed(String),

    /// JSON-RPC error object returned by the service
    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            RpcError::Unreachable(err.to_string())
        } else if err.is_timeout() {
            RpcError::Timeout
        } else if let Some(status) = err.status() {
            RpcError::Status(status.as_u16())
        } else {
            RpcError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Malformed(format!("JSON: {}", err))
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl JsonRpcResponse {
    /// Parse a response body into the `result` value or a typed failure
    pub(crate) fn parse(body: &str) -> Result<Value, RpcError> {
        if body.trim().is_empty() {
            return Err(RpcError::Malformed("empty response body".to_string()));
        }

        let response: JsonRpcResponse = serde_json::from_str(body)?;

        if let Some(error) = response.error {
            return Err(RpcError::Remote {
                code: error.code,
                message: error.message,
            });
        }

        response
            .result
            .ok_or_else(|| RpcError::Malformed("response has neither result nor error".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_result() {
        let value = JsonRpcResponse::parse(r#"{"jsonrpc":"2.0","id":1,"result":[1,2]}"#).unwrap();
        assert_eq!(value, json!([1, 2]));
    }

    #[test]
    fn test_parse_error_object() {
        let err = JsonRpcResponse::parse(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"no such method"}}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            RpcError::Remote {
                code: -32601,
                message: "no such method".to_string()
            }
        );
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            JsonRpcResponse::parse(""),
            Err(RpcError::Malformed(_))
        ));
        assert!(matches!(
            JsonRpcResponse::parse("<html>"),
            Err(RpcError::Malformed(_))
        ));
        assert!(matches!(
            JsonRpcResponse::parse(r#"{"jsonrpc":"2.0","id":1}"#),
            Err(RpcError::Malformed(_))
        ));
    }

    #[test]
    fn test_request_shape() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 7,
            method: methods::USER_GROUPS,
            params: json!([true]),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"jsonrpc": "2.0", "id": 7, "method": "user.groups", "params": [true]})
        );
    }
}
