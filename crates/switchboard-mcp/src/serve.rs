//! Serving side of MCP.
//!
//! [`McpHandler`] is implemented by anything that answers MCP requests
//! locally: the gateway's workspaces, the embedded prompt library and the
//! controller tools. [`handle_request`] turns one JSON-RPC request into the
//! matching handler call and wraps the result back up.

use crate::protocol::{
    error_codes, CallToolParams, GetPromptParams, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, McpPrompt, McpResource, McpResourceTemplate, McpTool,
    ReadResourceParams, ServerCapabilities, ServerInfo, PROTOCOL_VERSION,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

/// A local MCP capability provider.
///
/// Every listing and call has a default, so providers only implement the
/// capability kinds they actually serve.
#[async_trait]
pub trait McpHandler: Send + Sync {
    /// Name and version reported from `initialize`.
    fn server_info(&self) -> ServerInfo;

    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities::all()
    }

    fn instructions(&self) -> Option<String> {
        None
    }

    async fn list_tools(&self) -> Result<Vec<McpTool>, JsonRpcError> {
        Ok(Vec::new())
    }

    /// Run a tool and return the raw `tools/call` result.
    async fn call_tool(&self, name: &str, _arguments: Option<Value>) -> Result<Value, JsonRpcError> {
        Err(JsonRpcError::invalid_params(format!("Unknown tool: {name}")))
    }

    async fn list_prompts(&self) -> Result<Vec<McpPrompt>, JsonRpcError> {
        Ok(Vec::new())
    }

    async fn get_prompt(
        &self,
        name: &str,
        _arguments: Option<HashMap<String, String>>,
    ) -> Result<Value, JsonRpcError> {
        Err(JsonRpcError::invalid_params(format!("Unknown prompt: {name}")))
    }

    async fn list_resources(&self) -> Result<Vec<McpResource>, JsonRpcError> {
        Ok(Vec::new())
    }

    async fn list_resource_templates(&self) -> Result<Vec<McpResourceTemplate>, JsonRpcError> {
        Ok(Vec::new())
    }

    async fn read_resource(&self, uri: &str) -> Result<Value, JsonRpcError> {
        Err(JsonRpcError::invalid_params(format!("Unknown resource: {uri}")))
    }
}

/// Dispatch one request to `handler`.
///
/// Returns `None` for notifications, which never get a response.
pub async fn handle_request(
    handler: &dyn McpHandler,
    request: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    debug!(method = %request.method, id = ?request.id, "Handling MCP request");

    let Some(id) = request.id.clone() else {
        if !request.method.starts_with("notifications/") {
            debug!(method = %request.method, "Ignoring unexpected notification");
        }
        return None;
    };

    let result = dispatch(handler, &request.method, request.params).await;
    Some(match result {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(error) => JsonRpcResponse::failure(id, error),
    })
}

async fn dispatch(
    handler: &dyn McpHandler,
    method: &str,
    params: Option<Value>,
) -> Result<Value, JsonRpcError> {
    match method {
        "initialize" => {
            let result = InitializeResult {
                protocol_version: PROTOCOL_VERSION.to_string(),
                capabilities: handler.capabilities(),
                server_info: handler.server_info(),
                instructions: handler.instructions(),
            };
            to_value(&result)
        }
        "ping" => Ok(json!({})),
        "tools/list" => {
            let tools = handler.list_tools().await?;
            Ok(json!({ "tools": tools }))
        }
        "tools/call" => {
            let params: CallToolParams = parse_params(params)?;
            handler.call_tool(&params.name, params.arguments).await
        }
        "prompts/list" => {
            let prompts = handler.list_prompts().await?;
            Ok(json!({ "prompts": prompts }))
        }
        "prompts/get" => {
            let params: GetPromptParams = parse_params(params)?;
            handler.get_prompt(&params.name, params.arguments).await
        }
        "resources/list" => {
            let resources = handler.list_resources().await?;
            Ok(json!({ "resources": resources }))
        }
        "resources/templates/list" => {
            let templates = handler.list_resource_templates().await?;
            Ok(json!({ "resourceTemplates": templates }))
        }
        "resources/read" => {
            let params: ReadResourceParams = parse_params(params)?;
            handler.read_resource(&params.uri).await
        }
        _ => Err(JsonRpcError::method_not_found(method)),
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcError> {
    let params = params.ok_or_else(|| JsonRpcError::invalid_params("Missing params"))?;
    serde_json::from_value(params)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {e}")))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| {
        JsonRpcError::new(error_codes::INTERNAL_ERROR, format!("Serialization failed: {e}"))
    })
}
