//! Management tools exposed inside a workspace.
//!
//! When enabled, every workspace carries an in-process `switchboard` target
//! whose tools let an MCP client inspect and reconnect the other targets.

use crate::workspace::Workspace;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Weak;
use switchboard_mcp::protocol::ListChangedCapability;
use switchboard_mcp::{
    JsonRpcError, McpHandler, McpTool, ServerCapabilities, ServerInfo, ToolCallResult,
};
use tracing::info;

/// Name of the controller target.
pub const CONTROLLER_TARGET: &str = "switchboard";

/// Tool prefix of the controller target.
pub const CONTROLLER_PREFIX: &str = "switchboard__";

#[derive(Deserialize)]
struct ReconnectArgs {
    name: String,
}

/// Tools operating on the owning workspace.
pub struct Controller {
    workspace: Weak<Workspace>,
}

impl Controller {
    pub fn new(workspace: Weak<Workspace>) -> Self {
        Self { workspace }
    }

    fn workspace(&self) -> Result<std::sync::Arc<Workspace>, JsonRpcError> {
        self.workspace
            .upgrade()
            .ok_or_else(|| JsonRpcError::internal_error("Workspace is closed"))
    }
}

fn tool_result(result: ToolCallResult) -> Result<Value, JsonRpcError> {
    serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

#[async_trait]
impl McpHandler for Controller {
    fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: CONTROLLER_TARGET.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(ListChangedCapability::default()),
            ..ServerCapabilities::default()
        }
    }

    async fn list_tools(&self) -> Result<Vec<McpTool>, JsonRpcError> {
        Ok(vec![
            McpTool::new(
                "list_targets",
                "List the servers of this workspace with their connection status",
                json!({"type": "object", "properties": {}}),
            ),
            McpTool::new(
                "reconnect_target",
                "Reconnect one server of this workspace",
                json!({
                    "type": "object",
                    "properties": {
                        "name": {"type": "string", "description": "Server name"}
                    },
                    "required": ["name"]
                }),
            ),
        ])
    }

    async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<Value, JsonRpcError> {
        let workspace = self.workspace()?;
        match name {
            "list_targets" => {
                let targets = workspace.targets_info().await;
                let text = serde_json::to_string_pretty(&targets)
                    .map_err(|e| JsonRpcError::internal_error(e.to_string()))?;
                tool_result(ToolCallResult::text(text))
            }
            "reconnect_target" => {
                let args: ReconnectArgs =
                    serde_json::from_value(arguments.unwrap_or(Value::Null)).map_err(|e| {
                        JsonRpcError::invalid_params(format!("Invalid arguments: {e}"))
                    })?;
                info!(workspace = %workspace.id(), target_name = %args.name, "Reconnect requested");

                match workspace.reconnect_target(&args.name).await {
                    Ok(target) => {
                        let status = target.status().await;
                        tool_result(ToolCallResult::text(format!(
                            "{} is {status}",
                            target.name()
                        )))
                    }
                    Err(e) => tool_result(ToolCallResult::error(e.to_string())),
                }
            }
            other => Err(JsonRpcError::invalid_params(format!("Unknown tool: {other}"))),
        }
    }
}
