//! The workspace's embedded prompt library.
//!
//! Stored prompts are served over MCP like any upstream; message text may use
//! `{{argument}}` placeholders, substituted on `prompts/get`.

use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;
use switchboard_mcp::protocol::{
    GetPromptResult, ListChangedCapability, PromptArgument, PromptMessage,
};
use switchboard_mcp::{JsonRpcError, McpHandler, McpPrompt, ServerCapabilities, ServerInfo, ToolContent};
use switchboard_storage::PromptRecord;
use tokio::sync::RwLock;

/// Name of the in-process target serving the library.
pub const PROMPT_LIBRARY_TARGET: &str = "prompts";

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_\-]+)\s*\}\}").expect("valid regex"))
}

/// Replace `{{name}}` with the matching argument. Unknown placeholders render
/// as empty text.
pub fn render(template: &str, arguments: &HashMap<String, String>) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            arguments.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// Prompts stored in a workspace.
#[derive(Default)]
pub struct PromptLibrary {
    prompts: RwLock<Vec<PromptRecord>>,
}

impl PromptLibrary {
    pub fn new(prompts: Vec<PromptRecord>) -> Self {
        Self {
            prompts: RwLock::new(prompts),
        }
    }

    pub async fn list(&self) -> Vec<PromptRecord> {
        self.prompts.read().await.clone()
    }

    pub async fn get(&self, name: &str) -> Option<PromptRecord> {
        self.prompts
            .read()
            .await
            .iter()
            .find(|p| p.name == name)
            .cloned()
    }

    pub async fn add(&self, prompt: PromptRecord) -> GatewayResult<()> {
        validate(&prompt)?;
        let mut prompts = self.prompts.write().await;
        if prompts.iter().any(|p| p.name == prompt.name) {
            return Err(GatewayError::Duplicate(format!(
                "Prompt '{}' already exists",
                prompt.name
            )));
        }
        prompts.push(prompt);
        Ok(())
    }

    /// Replace the prompt named `name`. The replacement may carry a new name.
    pub async fn update(&self, name: &str, prompt: PromptRecord) -> GatewayResult<()> {
        validate(&prompt)?;
        let mut prompts = self.prompts.write().await;
        if prompt.name != name && prompts.iter().any(|p| p.name == prompt.name) {
            return Err(GatewayError::Duplicate(format!(
                "Prompt '{}' already exists",
                prompt.name
            )));
        }
        let slot = prompts
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| GatewayError::unknown("prompt", name))?;
        *slot = prompt;
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> GatewayResult<PromptRecord> {
        let mut prompts = self.prompts.write().await;
        let index = prompts
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| GatewayError::unknown("prompt", name))?;
        Ok(prompts.remove(index))
    }
}

fn validate(prompt: &PromptRecord) -> GatewayResult<()> {
    if prompt.name.trim().is_empty() {
        return Err(GatewayError::BadRequest("Prompt name must not be empty".to_string()));
    }
    Ok(())
}

fn to_listing(prompt: &PromptRecord) -> McpPrompt {
    let arguments = prompt
        .arguments
        .iter()
        .map(|arg| PromptArgument {
            name: arg.name.clone(),
            description: arg.description.clone(),
            required: Some(arg.required),
        })
        .collect::<Vec<_>>();

    McpPrompt {
        name: prompt.name.clone(),
        description: prompt.description.clone(),
        arguments: (!arguments.is_empty()).then_some(arguments),
        extra: Default::default(),
    }
}

#[async_trait]
impl McpHandler for PromptLibrary {
    fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: "switchboard-prompts".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            prompts: Some(ListChangedCapability::default()),
            ..ServerCapabilities::default()
        }
    }

    async fn list_prompts(&self) -> Result<Vec<McpPrompt>, JsonRpcError> {
        Ok(self.prompts.read().await.iter().map(to_listing).collect())
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> Result<Value, JsonRpcError> {
        let prompt = self
            .get(name)
            .await
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown prompt: {name}")))?;
        let arguments = arguments.unwrap_or_default();

        if let Some(missing) = prompt
            .arguments
            .iter()
            .find(|arg| arg.required && !arguments.contains_key(&arg.name))
        {
            return Err(JsonRpcError::invalid_params(format!(
                "Missing required argument '{}' for prompt '{name}'",
                missing.name
            )));
        }

        let result = GetPromptResult {
            description: prompt.description.clone(),
            messages: prompt
                .messages
                .iter()
                .map(|message| PromptMessage {
                    role: message.role.clone(),
                    content: ToolContent::Text {
                        text: render(&message.text, &arguments),
                    },
                })
                .collect(),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(e.to_string()))
    }
}

/// Shape accepted by the admin API for new prompts.
pub fn prompt_from_value(value: Value) -> GatewayResult<PromptRecord> {
    serde_json::from_value(value)
        .map_err(|e| GatewayError::BadRequest(format!("Invalid prompt: {e}")))
}
