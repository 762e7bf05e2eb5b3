//! Streamable HTTP transport for remote MCP servers.
//!
//! This implements the streamable HTTP transport for MCP, which uses:
//! - HTTP POST for sending requests
//! - a JSON body or an SSE stream for receiving the response
//! - the `mcp-session-id` header to keep a session across requests

use crate::error::{McpError, McpResult};
use crate::protocol::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::sse::SseParser;
use crate::transport::{reply_to_server_request, Transport};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Header carrying the server-assigned session id.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// HTTP transport configuration, shared by the streamable and legacy
/// transports.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    /// The server URL (e.g., `https://mcp.example.com/mcp`)
    pub url: String,
    /// Extra headers sent with every request
    pub headers: HashMap<String, String>,
    /// Optional bearer token
    pub auth_token: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            headers: HashMap::new(),
            auth_token: None,
            timeout_secs: 60,
        }
    }
}

impl HttpConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Streamable HTTP transport.
pub struct StreamableTransport {
    config: HttpConfig,
    client: Client,
    connected: AtomicBool,
    auth_token: RwLock<Option<String>>,
    /// Session id handed out by the server
    session_id: RwLock<Option<String>>,
}

impl StreamableTransport {
    /// Create a new streamable transport. No request is sent until the
    /// first call.
    pub fn new(config: HttpConfig) -> McpResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                McpError::connection_failed(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            auth_token: RwLock::new(config.auth_token.clone()),
            config,
            client,
            connected: AtomicBool::new(false),
            session_id: RwLock::new(None),
        })
    }

    /// Replace the bearer token used for subsequent requests.
    pub async fn set_auth_token(&self, token: Option<String>) {
        *self.auth_token.write().await = token;
    }

    /// The session id the server assigned, if any.
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    async fn build_request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, &self.config.url)
            .header("Accept", "application/json, text/event-stream");

        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }
        if let Some(token) = self.auth_token.read().await.as_ref() {
            req = req.bearer_auth(token);
        }
        if let Some(session) = self.session_id.read().await.as_ref() {
            req = req.header(SESSION_HEADER, session);
        }

        req
    }

    async fn post(&self, body: String) -> McpResult<reqwest::Response> {
        let response = self
            .build_request(reqwest::Method::POST)
            .await
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    McpError::Timeout
                } else if e.is_connect() {
                    McpError::connection_failed(format!("Connection failed: {e}"))
                } else {
                    McpError::protocol_error(format!("Request failed: {e}"))
                }
            })?;

        if let Some(session_id) = response.headers().get(SESSION_HEADER) {
            if let Ok(id) = session_id.to_str() {
                *self.session_id.write().await = Some(id.to_string());
            }
        }

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(McpError::AuthRequired);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(McpError::protocol_error(format!(
                "Server returned {status}: {text}"
            )));
        }

        Ok(response)
    }

    /// Read the response to `id` out of a JSON or event-stream body.
    async fn read_response(
        &self,
        id: &RequestId,
        response: reqwest::Response,
    ) -> McpResult<JsonRpcResponse> {
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains("text/event-stream") {
            return self.read_event_stream(id, response).await;
        }

        let text = response
            .text()
            .await
            .map_err(|e| McpError::protocol_error(format!("Failed to read response: {e}")))?;
        serde_json::from_str(&text)
            .map_err(|e| McpError::protocol_error(format!("Invalid JSON response: {e}")))
    }

    async fn read_event_stream(
        &self,
        id: &RequestId,
        response: reqwest::Response,
    ) -> McpResult<JsonRpcResponse> {
        let mut stream = response.bytes_stream();
        let mut parser = SseParser::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| McpError::protocol_error(format!("Stream error: {e}")))?;

            for event in parser.push(&chunk) {
                if event.event != "message" {
                    continue;
                }
                match JsonRpcMessage::parse(&event.data) {
                    Some(JsonRpcMessage::Response(response)) if &response.id == id => {
                        return Ok(response);
                    }
                    Some(JsonRpcMessage::Response(response)) => {
                        debug!(id = %response.id, "Skipping response for another request");
                    }
                    Some(JsonRpcMessage::Request(request)) => {
                        if let Some(reply) = reply_to_server_request(&request) {
                            let body = serde_json::to_string(&reply)?;
                            if let Err(e) = self.post(body).await {
                                warn!(error = %e, "Failed to answer server request");
                            }
                        }
                    }
                    Some(JsonRpcMessage::Notification(notification)) => {
                        debug!(method = %notification.method, "Server notification");
                    }
                    None => warn!(data = %event.data, "Ignoring malformed SSE message"),
                }
            }
        }

        Err(McpError::protocol_error("SSE stream ended without response"))
    }
}

#[async_trait]
impl Transport for StreamableTransport {
    async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        let id = request
            .id
            .clone()
            .ok_or_else(|| McpError::protocol_error("request is missing an id"))?;
        let body = serde_json::to_string(&request)?;

        debug!(id = %id, method = %request.method, "Sending streamable HTTP request");

        let response = self.post(body).await?;
        self.connected.store(true, Ordering::SeqCst);
        self.read_response(&id, response).await
    }

    async fn notify(&self, notification: JsonRpcNotification) -> McpResult<()> {
        let body = serde_json::to_string(&notification)?;

        debug!(method = %notification.method, "Sending streamable HTTP notification");

        match self.post(body).await {
            Ok(_) => Ok(()),
            Err(McpError::ProtocolError(message)) => {
                warn!(%message, "Notification returned non-success status");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn close(&self) -> McpResult<()> {
        self.connected.store(false, Ordering::SeqCst);

        if self.session_id.read().await.is_some() {
            match self.build_request(reqwest::Method::DELETE).await.send().await {
                Ok(response) => {
                    debug!(status = %response.status(), "Terminated streamable HTTP session")
                }
                Err(e) => debug!(error = %e, "Failed to terminate streamable HTTP session"),
            }
        }

        *self.session_id.write().await = None;
        debug!("Closed streamable HTTP transport");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
