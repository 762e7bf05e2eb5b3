//! In-memory transport to a local [`McpHandler`].
//!
//! The client half sends requests over a channel; a server task on the other
//! half runs each one through [`handle_request`]. Requests are handled
//! concurrently, like they would be by a real server.

use crate::error::{McpError, McpResult};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::serve::{handle_request, McpHandler};
use crate::transport::Transport;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

type Envelope = (JsonRpcRequest, Option<oneshot::Sender<JsonRpcResponse>>);

const CHANNEL_CAPACITY: usize = 64;

/// Transport linked to an in-process handler.
pub struct MemoryTransport {
    tx: mpsc::Sender<Envelope>,
    connected: Arc<AtomicBool>,
    server: JoinHandle<()>,
}

impl MemoryTransport {
    /// Link a new transport to `handler`.
    pub fn linked(handler: Arc<dyn McpHandler>) -> Self {
        let (tx, mut rx) = mpsc::channel::<Envelope>(CHANNEL_CAPACITY);

        let server = tokio::spawn(async move {
            while let Some((request, reply)) = rx.recv().await {
                let handler = handler.clone();
                tokio::spawn(async move {
                    let response = handle_request(handler.as_ref(), request).await;
                    if let (Some(response), Some(reply)) = (response, reply) {
                        let _ = reply.send(response);
                    }
                });
            }
            debug!("In-memory server half stopped");
        });

        Self {
            tx,
            connected: Arc::new(AtomicBool::new(true)),
            server,
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        if !self.is_connected() {
            return Err(McpError::Closed);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((request, Some(reply_tx)))
            .await
            .map_err(|_| McpError::Closed)?;
        reply_rx.await.map_err(|_| McpError::Closed)
    }

    async fn notify(&self, notification: JsonRpcNotification) -> McpResult<()> {
        if !self.is_connected() {
            return Err(McpError::Closed);
        }
        let request = JsonRpcRequest {
            jsonrpc: notification.jsonrpc,
            id: None,
            method: notification.method,
            params: notification.params,
        };
        self.tx
            .send((request, None))
            .await
            .map_err(|_| McpError::Closed)
    }

    async fn close(&self) -> McpResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.server.abort();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.server.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{JsonRpcError, McpTool, ServerInfo};
    use serde_json::{json, Value};

    struct Counter;

    #[async_trait]
    impl McpHandler for Counter {
        fn server_info(&self) -> ServerInfo {
            ServerInfo {
                name: "counter".to_string(),
                version: "0.0.1".to_string(),
            }
        }

        async fn list_tools(&self) -> Result<Vec<McpTool>, JsonRpcError> {
            Ok(vec![McpTool::new("count", "Count", json!({"type": "object"}))])
        }

        async fn call_tool(&self, _name: &str, _arguments: Option<Value>) -> Result<Value, JsonRpcError> {
            Ok(json!({"content": [{"type": "text", "text": "1"}]}))
        }
    }

    #[tokio::test]
    async fn test_request_reaches_handler() {
        let transport = MemoryTransport::linked(Arc::new(Counter));
        let response = transport
            .request(JsonRpcRequest::new(1, "tools/list", None))
            .await
            .unwrap();
        assert_eq!(response.result.unwrap()["tools"][0]["name"], "count");
    }

    #[tokio::test]
    async fn test_concurrent_requests() {
        let transport = Arc::new(MemoryTransport::linked(Arc::new(Counter)));
        let calls = (0..10).map(|i| {
            let transport = transport.clone();
            async move {
                transport
                    .request(JsonRpcRequest::new(i, "tools/call", Some(json!({"name": "count"}))))
                    .await
            }
        });
        let results = futures::future::join_all(calls).await;
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_requests() {
        let transport = MemoryTransport::linked(Arc::new(Counter));
        transport.close().await.unwrap();
        assert!(!transport.is_connected());
        let result = transport.request(JsonRpcRequest::new(1, "ping", None)).await;
        assert!(matches!(result, Err(McpError::Closed)));
    }
}
