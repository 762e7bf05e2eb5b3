//! MCP client for a single upstream server.

use crate::error::{McpError, McpResult};
use crate::protocol::{
    CallToolParams, GetPromptParams, Implementation, InitializeParams, InitializeResult,
    JsonRpcNotification, JsonRpcRequest, McpPrompt, McpResource, McpResourceTemplate, McpTool,
    ReadResourceParams,
};
use crate::transport::Transport;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default bound on a single upstream request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on pages followed for one listing.
const MAX_PAGES: usize = 100;

/// Client options.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Bound on every request, including `initialize`.
    pub request_timeout: Duration,
    /// How the client introduces itself.
    pub client_info: Implementation,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            client_info: Implementation::default(),
        }
    }
}

/// One page of a paginated listing; the item list sits under a method
/// specific key.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page {
    #[serde(flatten)]
    items: HashMap<String, Value>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// An initialized connection to one MCP server.
pub struct McpClient {
    name: String,
    transport: Arc<dyn Transport>,
    options: ClientOptions,
    init: InitializeResult,
    next_id: AtomicI64,
}

impl McpClient {
    /// Run the initialize handshake over `transport`.
    ///
    /// The transport is closed again if the handshake fails.
    pub async fn connect(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        options: ClientOptions,
    ) -> McpResult<Self> {
        let name = name.into();
        let next_id = AtomicI64::new(1);

        let init = match Self::initialize(&name, transport.as_ref(), &options, &next_id).await {
            Ok(init) => init,
            Err(e) => {
                if let Err(close_error) = transport.close().await {
                    debug!(server = %name, error = %close_error, "Close after failed handshake");
                }
                return Err(e);
            }
        };

        Ok(Self {
            name,
            transport,
            options,
            init,
            next_id,
        })
    }

    async fn initialize(
        name: &str,
        transport: &dyn Transport,
        options: &ClientOptions,
        next_id: &AtomicI64,
    ) -> McpResult<InitializeResult> {
        let params = InitializeParams {
            client_info: options.client_info.clone(),
            ..InitializeParams::default()
        };
        let request = JsonRpcRequest::new(
            next_id.fetch_add(1, Ordering::SeqCst),
            "initialize",
            Some(serde_json::to_value(&params)?),
        );

        let response = tokio::time::timeout(options.request_timeout, transport.request(request))
            .await
            .map_err(|_| McpError::Timeout)??;

        if let Some(error) = response.error {
            return Err(McpError::InitializationFailed(error.message));
        }

        let init: InitializeResult = serde_json::from_value(
            response
                .result
                .ok_or_else(|| McpError::protocol_error("Missing initialize result"))?,
        )
        .map_err(|e| McpError::protocol_error(e.to_string()))?;

        debug!(
            server = %name,
            protocol_version = %init.protocol_version,
            server_name = %init.server_info.name,
            "MCP server initialized"
        );

        transport
            .notify(JsonRpcNotification::new("notifications/initialized", None))
            .await?;

        Ok(init)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// What the server reported from `initialize`.
    pub fn server(&self) -> &InitializeResult {
        &self.init
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    fn next_request_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Send a request and return its result, mapping JSON-RPC errors to
    /// [`McpError::Rpc`].
    pub async fn request(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        let request = JsonRpcRequest::new(self.next_request_id(), method, params);

        let response =
            tokio::time::timeout(self.options.request_timeout, self.transport.request(request))
                .await
                .map_err(|_| {
                    warn!(server = %self.name, method, "MCP request timed out");
                    McpError::Timeout
                })??;

        if let Some(error) = response.error {
            return Err(McpError::Rpc {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Follow `nextCursor` until the listing is complete.
    async fn list_all<T: DeserializeOwned>(&self, method: &str, key: &str) -> McpResult<Vec<T>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let params = cursor
                .as_ref()
                .map(|c| serde_json::json!({ "cursor": c }));
            let result = self.request(method, params).await?;
            let mut page: Page = serde_json::from_value(result)
                .map_err(|e| McpError::protocol_error(format!("Invalid {method} result: {e}")))?;

            if let Some(list) = page.items.remove(key) {
                let list: Vec<T> = serde_json::from_value(list).map_err(|e| {
                    McpError::protocol_error(format!("Invalid {method} result: {e}"))
                })?;
                items.extend(list);
            }

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(items),
            }
        }

        warn!(server = %self.name, method, "Stopped following pagination cursors");
        Ok(items)
    }

    /// List tools. Servers that do not advertise tools yield an empty list.
    pub async fn list_tools(&self) -> McpResult<Vec<McpTool>> {
        if self.init.capabilities.tools.is_none() {
            debug!(server = %self.name, "Server does not support tools capability");
            return Ok(Vec::new());
        }
        self.list_all("tools/list", "tools").await
    }

    pub async fn list_prompts(&self) -> McpResult<Vec<McpPrompt>> {
        if self.init.capabilities.prompts.is_none() {
            return Ok(Vec::new());
        }
        self.list_all("prompts/list", "prompts").await
    }

    pub async fn list_resources(&self) -> McpResult<Vec<McpResource>> {
        if self.init.capabilities.resources.is_none() {
            return Ok(Vec::new());
        }
        self.list_all("resources/list", "resources").await
    }

    pub async fn list_resource_templates(&self) -> McpResult<Vec<McpResourceTemplate>> {
        if self.init.capabilities.resources.is_none() {
            return Ok(Vec::new());
        }
        self.list_all("resources/templates/list", "resourceTemplates")
            .await
    }

    /// Call a tool and return the raw result.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> McpResult<Value> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        self.request("tools/call", Some(serde_json::to_value(&params)?))
            .await
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> McpResult<Value> {
        let params = GetPromptParams {
            name: name.to_string(),
            arguments,
        };
        self.request("prompts/get", Some(serde_json::to_value(&params)?))
            .await
    }

    pub async fn read_resource(&self, uri: &str) -> McpResult<Value> {
        let params = ReadResourceParams {
            uri: uri.to_string(),
        };
        self.request("resources/read", Some(serde_json::to_value(&params)?))
            .await
    }

    pub async fn ping(&self) -> McpResult<()> {
        self.request("ping", None).await.map(|_| ())
    }

    /// Close the underlying transport.
    pub async fn close(&self) -> McpResult<()> {
        self.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTransport;
    use crate::protocol::{JsonRpcError, RequestId, ServerCapabilities, ServerInfo};
    use crate::serve::McpHandler;
    use crate::JsonRpcResponse;
    use async_trait::async_trait;
    use serde_json::json;

    struct Tools {
        capabilities: ServerCapabilities,
    }

    #[async_trait]
    impl McpHandler for Tools {
        fn server_info(&self) -> ServerInfo {
            ServerInfo {
                name: "tools".to_string(),
                version: "1".to_string(),
            }
        }

        fn capabilities(&self) -> ServerCapabilities {
            self.capabilities.clone()
        }

        async fn list_tools(&self) -> Result<Vec<McpTool>, JsonRpcError> {
            Ok(vec![
                McpTool::new("a", "A", json!({"type": "object"})),
                McpTool::new("b", "B", json!({"type": "object"})),
            ])
        }

        async fn call_tool(&self, name: &str, _arguments: Option<Value>) -> Result<Value, JsonRpcError> {
            match name {
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(json!({}))
                }
                "a" => Ok(json!({"content": [{"type": "text", "text": "from a"}]})),
                _ => Err(JsonRpcError::invalid_params(format!("Unknown tool: {name}"))),
            }
        }
    }

    async fn connect(capabilities: ServerCapabilities, timeout: Duration) -> McpClient {
        let transport = Arc::new(MemoryTransport::linked(Arc::new(Tools { capabilities })));
        McpClient::connect(
            "test",
            transport,
            ClientOptions {
                request_timeout: timeout,
                ..ClientOptions::default()
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_connect_and_list() {
        let client = connect(ServerCapabilities::all(), DEFAULT_REQUEST_TIMEOUT).await;
        assert_eq!(client.server().server_info.name, "tools");
        let names: Vec<_> = client
            .list_tools()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(client.list_prompts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_capabilities_gate_listings() {
        let client = connect(ServerCapabilities::default(), DEFAULT_REQUEST_TIMEOUT).await;
        assert!(client.list_tools().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_call_tool_returns_raw_result() {
        let client = connect(ServerCapabilities::all(), DEFAULT_REQUEST_TIMEOUT).await;
        let result = client.call_tool("a", None).await.unwrap();
        assert_eq!(result["content"][0]["text"], "from a");
    }

    #[tokio::test]
    async fn test_rpc_error_is_preserved() {
        let client = connect(ServerCapabilities::all(), DEFAULT_REQUEST_TIMEOUT).await;
        match client.call_tool("missing", None).await {
            Err(McpError::Rpc { code, message, .. }) => {
                assert_eq!(code, -32602);
                assert_eq!(message, "Unknown tool: missing");
            }
            other => panic!("expected rpc error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let client = connect(ServerCapabilities::all(), Duration::from_millis(100)).await;
        let result = client.call_tool("slow", None).await;
        assert!(matches!(result, Err(McpError::Timeout)));
    }

    /// Serves `tools/list` in two pages.
    struct Paged;

    #[async_trait]
    impl Transport for Paged {
        async fn request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
            let id = request.id.clone().unwrap_or(RequestId::Number(1));
            let result = match (request.method.as_str(), request.params) {
                ("initialize", _) => json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "paged", "version": "1"}
                }),
                ("tools/list", None) => json!({"tools": [{"name": "one"}], "nextCursor": "p2"}),
                ("tools/list", Some(_)) => json!({"tools": [{"name": "two"}]}),
                _ => json!({}),
            };
            Ok(JsonRpcResponse::success(id, result))
        }

        async fn notify(&self, _notification: JsonRpcNotification) -> McpResult<()> {
            Ok(())
        }

        async fn close(&self) -> McpResult<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_pagination() {
        let client = McpClient::connect("paged", Arc::new(Paged), ClientOptions::default())
            .await
            .unwrap();
        let names: Vec<_> = client
            .list_tools()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["one", "two"]);
    }
}
