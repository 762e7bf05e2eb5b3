//! Server-Sent Events support.
//!
//! [`SseParser`] turns a byte stream into events and is shared by both HTTP
//! transports. [`LegacySseTransport`] is the older MCP HTTP transport:
//! - `GET <url>` opens an event stream whose first `endpoint` event names
//!   the URL to POST requests to
//! - responses come back as `message` events on that stream

use crate::error::{McpError, McpResult};
use crate::protocol::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::streamable::HttpConfig;
use crate::transport::{await_response, reply_to_server_request, PendingRequests, Transport};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name; `message` when the stream did not name it.
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

/// Incremental event-stream parser.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                "id" => self.id = Some(value.to_string()),
                _ => {}
            }
        }

        events
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let id = self.id.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
            id,
        })
    }
}

/// Legacy HTTP+SSE transport.
pub struct LegacySseTransport {
    client: Client,
    config: HttpConfig,
    endpoint: Url,
    pending: PendingRequests,
    connected: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl LegacySseTransport {
    /// Open the event stream and wait for the server to announce its
    /// message endpoint.
    pub async fn connect(config: HttpConfig) -> McpResult<Self> {
        let base = Url::parse(&config.url)
            .map_err(|e| McpError::connection_failed(format!("invalid url '{}': {e}", config.url)))?;

        // No overall timeout: the stream stays open for the transport's lifetime.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| McpError::connection_failed(format!("Failed to create HTTP client: {e}")))?;

        let mut request = client
            .get(base.clone())
            .header("Accept", "text/event-stream");
        for (key, value) in &config.headers {
            request = request.header(key, value);
        }
        if let Some(token) = &config.auth_token {
            request = request.bearer_auth(token);
        }

        debug!(url = %base, "Opening legacy SSE stream");

        let response = request.send().await.map_err(|e| {
            McpError::connection_failed(format!("Connection failed: {e}"))
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(McpError::AuthRequired);
        }
        if !status.is_success() {
            return Err(McpError::connection_failed(format!(
                "SSE endpoint returned {status}"
            )));
        }

        let pending = PendingRequests::new();
        let connected = Arc::new(AtomicBool::new(true));
        let (endpoint_tx, endpoint_rx) = oneshot::channel();

        let reader = tokio::spawn(read_stream(
            response,
            base,
            client.clone(),
            pending.clone(),
            connected.clone(),
            endpoint_tx,
        ));

        let endpoint =
            match tokio::time::timeout(Duration::from_secs(config.timeout_secs), endpoint_rx).await {
                Ok(Ok(endpoint)) => endpoint,
                Ok(Err(_)) => {
                    reader.abort();
                    return Err(McpError::connection_failed(
                        "SSE stream ended before an endpoint event",
                    ));
                }
                Err(_) => {
                    reader.abort();
                    return Err(McpError::Timeout);
                }
            };

        debug!(endpoint = %endpoint, "Legacy SSE transport ready");

        Ok(Self {
            client,
            config,
            endpoint,
            pending,
            connected,
            reader,
        })
    }

    /// The URL requests are POSTed to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post(&self, body: String) -> McpResult<()> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .header("Content-Type", "application/json")
            .body(body);
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                McpError::Timeout
            } else {
                McpError::connection_failed(format!("POST failed: {e}"))
            }
        })?;

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
        Ok(())
    }
}

async fn read_stream(
    response: reqwest::Response,
    base: Url,
    client: Client,
    pending: PendingRequests,
    connected: Arc<AtomicBool>,
    endpoint_tx: oneshot::Sender<Url>,
) {
    let mut endpoint_tx = Some(endpoint_tx);
    let mut endpoint: Option<Url> = None;
    let mut parser = SseParser::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, "Legacy SSE stream error");
                break;
            }
        };

        for event in parser.push(&chunk) {
            if event.event == "endpoint" {
                match base.join(event.data.trim()) {
                    Ok(url) => {
                        endpoint = Some(url.clone());
                        if let Some(tx) = endpoint_tx.take() {
                            let _ = tx.send(url);
                        }
                    }
                    Err(e) => warn!(data = %event.data, error = %e, "Invalid endpoint event"),
                }
                continue;
            }

            if event.event != "message" {
                continue;
            }

            match JsonRpcMessage::parse(&event.data) {
                Some(JsonRpcMessage::Response(response)) => {
                    pending.resolve(response).await;
                }
                Some(JsonRpcMessage::Request(request)) => {
                    let (Some(reply), Some(url)) = (reply_to_server_request(&request), &endpoint)
                    else {
                        continue;
                    };
                    if let Err(e) = client.post(url.clone()).json(&reply).send().await {
                        warn!(error = %e, "Failed to answer server request");
                    }
                }
                Some(JsonRpcMessage::Notification(notification)) => {
                    debug!(method = %notification.method, "Server notification");
                }
                None => warn!(data = %event.data, "Ignoring malformed SSE message"),
            }
        }
    }

    debug!("Legacy SSE stream closed");
    connected.store(false, Ordering::SeqCst);
    pending.fail_all().await;
}

#[async_trait]
impl Transport for LegacySseTransport {
    async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        if !self.is_connected() {
            return Err(McpError::Closed);
        }

        debug!(id = ?request.id, method = %request.method, "Sending legacy SSE request");

        let rx = self.pending.register(&request).await?;
        let body = serde_json::to_string(&request)?;
        if let Err(e) = self.post(body).await {
            if let Some(id) = &request.id {
                self.pending.cancel(id).await;
            }
            return Err(e);
        }

        await_response(&self.pending, &request, rx).await
    }

    async fn notify(&self, notification: JsonRpcNotification) -> McpResult<()> {
        let body = serde_json::to_string(&notification)?;
        self.post(body).await
    }

    async fn close(&self) -> McpResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.reader.abort();
        self.pending.fail_all().await;
        debug!("Closed legacy SSE transport");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for LegacySseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parser_single_event() {
        let mut parser = SseParser::new();
        let events = parser.push(b"event: endpoint\ndata: /messages?sessionId=1\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "endpoint".to_string(),
                data: "/messages?sessionId=1".to_string(),
                id: None,
            }]
        );
    }

    #[test]
    fn test_parser_split_chunks_and_crlf() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"data: {\"a\":").is_empty());
        assert!(parser.push(b"1}\r\n").is_empty());
        let events = parser.push(b"\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].data, "{\"a\":1}");
    }

    #[test]
    fn test_parser_multiline_data_comments_and_ids() {
        let mut parser = SseParser::new();
        let events = parser.push(b": keep-alive\n\nid: 7\ndata: one\ndata: two\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "one\ntwo");
        assert_eq!(events[0].id.as_deref(), Some("7"));
    }

    #[test]
    fn test_parser_split_utf8() {
        let mut parser = SseParser::new();
        let bytes = "data: héllo\n\n".as_bytes();
        let (first, second) = bytes.split_at(8);
        assert!(parser.push(first).is_empty());
        let events = parser.push(second);
        assert_eq!(events[0].data, "héllo");
    }

    #[tokio::test]
    async fn test_connect_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sse"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let config = HttpConfig::new(format!("{}/sse", server.uri()));
        let result = LegacySseTransport::connect(config).await;
        assert!(matches!(result, Err(McpError::AuthRequired)));
    }

    #[tokio::test]
    async fn test_connect_reads_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sse"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string("event: endpoint\ndata: /messages?sessionId=abc\n\n"),
            )
            .mount(&server)
            .await;

        let config = HttpConfig::new(format!("{}/sse", server.uri()));
        let transport = LegacySseTransport::connect(config).await.unwrap();
        assert_eq!(transport.endpoint().path(), "/messages");
        assert_eq!(transport.endpoint().query(), Some("sessionId=abc"));
    }

    #[tokio::test]
    async fn test_connect_without_endpoint_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sse"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string("event: message\ndata: {}\n\n"),
            )
            .mount(&server)
            .await;

        let config = HttpConfig::new(format!("{}/sse", server.uri()));
        let result = LegacySseTransport::connect(config).await;
        assert!(matches!(result, Err(McpError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let mut config = HttpConfig::new("http://127.0.0.1:1/sse");
        config.timeout_secs = 1;
        let result = LegacySseTransport::connect(config).await;
        assert!(matches!(result, Err(McpError::ConnectionFailed(_))));
    }
}
