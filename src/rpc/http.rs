//! HTTP transport for the JSON-RPC channel.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{JsonRpcRequest, JsonRpcResponse, RpcChannel, RpcError};
use crate::config::ServiceConfig;

/// JSON-RPC over HTTP POST to the local Better BibTeX endpoint
#[derive(Debug, Clone)]
pub struct HttpRpcChannel {
    client: Arc<Client>,
    base_url: String,
    rpc_path: String,
    next_id: Arc<AtomicU64>,
}

impl HttpRpcChannel {
    /// Create a channel from service settings
    pub fn new(config: &ServiceConfig) -> Result<Self, RpcError> {
        let client = Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| RpcError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self::from_client(Arc::new(client), config))
    }

    /// Create from an existing reqwest Client
    pub fn from_client(client: Arc<Client>, config: &ServiceConfig) -> Self {
        Self {
            client,
            base_url: config.base_url(),
            rpc_path: config.rpc_path.clone(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, self.rpc_path)
    }
}

#[async_trait]
impl RpcChannel for HttpRpcChannel {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        tracing::debug!(method, id, "json-rpc call");

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(method, status = status.as_u16(), "json-rpc call failed");
            return Err(RpcError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        JsonRpcResponse::parse(&body)
    }

    async fn fetch(&self, path: &str) -> Result<String, RpcError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "fetch");

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Status(status.as_u16()));
        }

        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn channel_for(server: &mockito::ServerGuard) -> HttpRpcChannel {
        let addr = server.socket_address();
        let config = ServiceConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            ..ServiceConfig::default()
        };
        HttpRpcChannel::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_call_posts_json_rpc() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/better-bibtex/json-rpc")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({
                "jsonrpc": "2.0",
                "method": "user.groups",
                "params": [true]
            })))
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":[]}"#)
            .create_async()
            .await;

        let channel = channel_for(&server);
        let result = channel.call("user.groups", json!([true])).await.unwrap();

        assert_eq!(result, json!([]));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_call_surfaces_remote_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/better-bibtex/json-rpc")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"bad params"}}"#)
            .create_async()
            .await;

        let err = channel_for(&server)
            .call("item.attachments", json!(["nokey"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Remote { code: -32602, .. }));
    }

    #[tokio::test]
    async fn test_call_non_success_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/better-bibtex/json-rpc")
            .with_status(500)
            .create_async()
            .await;

        let err = channel_for(&server)
            .call("user.groups", json!([true]))
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::Status(500));
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Regex("^/better-bibtex/collection".to_string()))
            .with_body(r#"[{"id":"k1"}]"#)
            .create_async()
            .await;

        let body = channel_for(&server)
            .fetch("/better-bibtex/collection?/1/ABCD.json")
            .await
            .unwrap();
        assert_eq!(body, r#"[{"id":"k1"}]"#);
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        // Grab a free port, then close it so nothing is listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = ServiceConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..ServiceConfig::default()
        };
        let channel = HttpRpcChannel::new(&config).unwrap();

        let err = channel.call("user.groups", json!([true])).await.unwrap_err();
        assert!(matches!(err, RpcError::Unreachable(_)), "got {err:?}");
    }
}
