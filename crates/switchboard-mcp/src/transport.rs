//! Transport layer for MCP communication.

use crate::error::{McpError, McpResult};
use crate::protocol::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

/// Transport trait for MCP communication.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for its response.
    async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse>;

    /// Send a notification (no response expected).
    async fn notify(&self, notification: JsonRpcNotification) -> McpResult<()>;

    /// Close the transport.
    async fn close(&self) -> McpResult<()>;

    /// Check if the transport is connected.
    fn is_connected(&self) -> bool;
}

/// Requests awaiting a response from a transport whose reads happen on a
/// background task.
#[derive(Clone, Default)]
pub struct PendingRequests {
    inner: Arc<Mutex<HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the response to `request`.
    pub async fn register(&self, request: &JsonRpcRequest) -> McpResult<oneshot::Receiver<JsonRpcResponse>> {
        let id = request
            .id
            .clone()
            .ok_or_else(|| McpError::protocol_error("request is missing an id"))?;
        let (tx, rx) = oneshot::channel();
        self.inner.lock().await.insert(id, tx);
        Ok(rx)
    }

    /// Deliver a response. Returns false if nobody was waiting for it.
    pub async fn resolve(&self, response: JsonRpcResponse) -> bool {
        let sender = self.inner.lock().await.remove(&response.id);
        match sender {
            Some(tx) => tx.send(response).is_ok(),
            None => {
                debug!(id = %response.id, "Dropping response with no pending request");
                false
            }
        }
    }

    /// Forget a request, e.g. after its send failed.
    pub async fn cancel(&self, id: &RequestId) {
        self.inner.lock().await.remove(id);
    }

    /// Drop every waiter; their receivers observe the transport as closed.
    pub async fn fail_all(&self) {
        self.inner.lock().await.clear();
    }

    /// Number of outstanding requests.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Whether no requests are outstanding.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

/// Removes its request from the pending map when dropped.
///
/// Callers bound requests with a timeout; the waiting future is then dropped
/// without ever seeing a response, and the entry would otherwise stay behind.
struct PendingGuard {
    pending: PendingRequests,
    id: Option<RequestId>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Ok(mut map) = self.pending.inner.try_lock() {
            map.remove(&id);
            return;
        }
        let pending = self.pending.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { pending.cancel(&id).await });
        }
    }
}

/// Wait for the response to a registered request, mapping a dropped sender
/// to [`McpError::Closed`]. The request is forgotten however the wait ends.
pub(crate) async fn await_response(
    pending: &PendingRequests,
    request: &JsonRpcRequest,
    rx: oneshot::Receiver<JsonRpcResponse>,
) -> McpResult<JsonRpcResponse> {
    let _guard = PendingGuard {
        pending: pending.clone(),
        id: request.id.clone(),
    };
    rx.await.map_err(|_| McpError::Closed)
}

/// Reply for a request the upstream server sent to us.
///
/// The gateway advertises no client capabilities, so anything other than
/// `ping` is answered with "method not found".
pub(crate) fn reply_to_server_request(request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
    let id = request.id.clone()?;
    let response = if request.method == "ping" {
        JsonRpcResponse::success(id, json!({}))
    } else {
        JsonRpcResponse::failure(id, JsonRpcError::method_not_found(&request.method))
    };
    Some(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pending_register_and_resolve() {
        let pending = PendingRequests::new();
        let request = JsonRpcRequest::new(1, "tools/list", None);
        let rx = pending.register(&request).await.unwrap();
        assert_eq!(pending.len().await, 1);

        let delivered = pending
            .resolve(JsonRpcResponse::success(RequestId::Number(1), json!({"ok": true})))
            .await;
        assert!(delivered);

        let response = await_response(&pending, &request, rx).await.unwrap();
        assert_eq!(response.result.unwrap()["ok"], true);
        assert!(pending.is_empty().await);
    }

    #[tokio::test]
    async fn test_pending_unknown_response_is_dropped() {
        let pending = PendingRequests::new();
        let delivered = pending
            .resolve(JsonRpcResponse::success(RequestId::Number(9), json!({})))
            .await;
        assert!(!delivered);
    }

    #[tokio::test]
    async fn test_fail_all_closes_waiters() {
        let pending = PendingRequests::new();
        let request = JsonRpcRequest::new(1, "ping", None);
        let rx = pending.register(&request).await.unwrap();
        pending.fail_all().await;
        assert!(matches!(
            await_response(&pending, &request, rx).await,
            Err(McpError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_abandoned_wait_forgets_request() {
        let pending = PendingRequests::new();
        for id in 1..=5 {
            let request = JsonRpcRequest::new(id, "tools/call", None);
            let rx = pending.register(&request).await.unwrap();
            let waited = tokio::time::timeout(
                std::time::Duration::from_millis(10),
                await_response(&pending, &request, rx),
            )
            .await;
            assert!(waited.is_err());
        }
        assert!(pending.is_empty().await);
    }

    #[tokio::test]
    async fn test_register_requires_id() {
        let pending = PendingRequests::new();
        let mut request = JsonRpcRequest::new(1, "ping", None);
        request.id = None;
        assert!(pending.register(&request).await.is_err());
    }

    #[test]
    fn test_reply_to_server_request() {
        let ping = JsonRpcRequest::new(5, "ping", None);
        let reply = reply_to_server_request(&ping).unwrap();
        assert!(reply.error.is_none());

        let sampling = JsonRpcRequest::new(6, "sampling/createMessage", None);
        let reply = reply_to_server_request(&sampling).unwrap();
        assert_eq!(reply.error.unwrap().code, -32601);
    }
}
