//! One connection to one upstream MCP server.
//!
//! A [`Target`] is built from a persisted [`ServerRecord`] (process or network)
//! or from a local [`McpHandler`] (in-process). It is never connected on
//! construction; the owning workspace calls [`Target::connect`].

use crate::coordinator::OAuthCoordinator;
use crate::error::{GatewayError, GatewayResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchboard_mcp::{
    ClientOptions, HttpConfig, LegacySseTransport, McpClient, McpError, McpHandler, McpPrompt,
    McpResource, McpResourceTemplate, McpTool, MemoryTransport, StdioConfig, StdioTransport,
    StreamableTransport,
};
use switchboard_storage::{ServerRecord, TransportRecord};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Separator between an auto prefix and the tool name.
pub const PREFIX_SEPARATOR: &str = "__";

/// Connection status of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Disconnected,
    Connected,
    Unauthorized,
    Error,
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetStatus::Disconnected => "disconnected",
            TargetStatus::Connected => "connected",
            TargetStatus::Unauthorized => "unauthorized",
            TargetStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// How a target reaches its upstream.
#[derive(Clone)]
pub enum TargetKind {
    /// Subprocess over stdio.
    Process(StdioConfig),
    /// HTTP: streamable first, legacy SSE as fallback.
    Network {
        url: String,
        headers: HashMap<String, String>,
        oauth: bool,
    },
    /// Local provider over an in-memory channel.
    InProcess(Arc<dyn McpHandler>),
}

impl TargetKind {
    /// Build the variant for a persisted transport descriptor.
    pub fn from_transport(transport: &TransportRecord) -> Self {
        match transport {
            TransportRecord::Stdio { command, args, env } => TargetKind::Process(StdioConfig {
                command: command.clone(),
                args: args.clone(),
                env: env.clone(),
                cwd: None,
            }),
            TransportRecord::Http {
                url,
                headers,
                oauth,
            } => TargetKind::Network {
                url: url.clone(),
                headers: headers.clone(),
                oauth: *oauth,
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TargetKind::Process(_) => "process",
            TargetKind::Network { .. } => "network",
            TargetKind::InProcess(_) => "in-process",
        }
    }

    fn to_transport(&self) -> Option<TransportRecord> {
        match self {
            TargetKind::Process(config) => Some(TransportRecord::Stdio {
                command: config.command.clone(),
                args: config.args.clone(),
                env: config.env.clone(),
            }),
            TargetKind::Network {
                url,
                headers,
                oauth,
            } => Some(TransportRecord::Http {
                url: url.clone(),
                headers: headers.clone(),
                oauth: *oauth,
            }),
            TargetKind::InProcess(_) => None,
        }
    }
}

impl fmt::Debug for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Process(config) => f.debug_tuple("Process").field(config).finish(),
            TargetKind::Network { url, oauth, .. } => f
                .debug_struct("Network")
                .field("url", url)
                .field("oauth", oauth)
                .finish_non_exhaustive(),
            TargetKind::InProcess(handler) => f
                .debug_tuple("InProcess")
                .field(&handler.server_info().name)
                .finish(),
        }
    }
}

/// User-editable settings of a target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetSettings {
    pub tool_prefix: Option<String>,
    pub disabled_tools: Vec<String>,
    pub disabled: bool,
    pub source: Option<String>,
}

/// Partial update of [`TargetSettings`]. Empty strings and lists unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetPatch {
    pub tool_prefix: Option<String>,
    pub disabled_tools: Option<Vec<String>>,
    pub disabled: Option<bool>,
}

/// Connection state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetState {
    pub status: TargetStatus,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for TargetState {
    fn default() -> Self {
        Self {
            status: TargetStatus::Disconnected,
            last_connected_at: None,
            last_error: None,
        }
    }
}

/// Result of a non-throwing connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    /// Waiting for the user to complete an OAuth flow.
    Unauthorized,
    Failed(String),
}

/// Serializable view of a target.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub name: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub status: TargetStatus,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_prefix: Option<String>,
    pub disabled_tools: Vec<String>,
    pub disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

enum Opened {
    Client(McpClient),
    /// Authorization flow started; carries the message recorded as last error.
    Unauthorized(String),
}

/// One upstream connection.
pub struct Target {
    name: String,
    kind: TargetKind,
    settings: RwLock<TargetSettings>,
    state: RwLock<TargetState>,
    client: RwLock<Option<Arc<McpClient>>>,
    auto_prefix: AtomicBool,
    coordinator: Option<Arc<OAuthCoordinator>>,
    options: ClientOptions,
    connect_lock: Mutex<()>,
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Target {
    pub fn new(
        name: impl Into<String>,
        kind: TargetKind,
        settings: TargetSettings,
        coordinator: Option<Arc<OAuthCoordinator>>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            settings: RwLock::new(settings),
            state: RwLock::new(TargetState::default()),
            client: RwLock::new(None),
            auto_prefix: AtomicBool::new(false),
            coordinator,
            options: ClientOptions {
                request_timeout,
                ..ClientOptions::default()
            },
            connect_lock: Mutex::new(()),
        }
    }

    /// Build a process or network target from its persisted record.
    pub fn from_record(
        record: &ServerRecord,
        coordinator: Option<Arc<OAuthCoordinator>>,
        request_timeout: Duration,
    ) -> Self {
        let settings = TargetSettings {
            tool_prefix: record.tool_prefix.clone().filter(|p| !p.is_empty()),
            disabled_tools: record.disabled_tools.clone(),
            disabled: record.disabled,
            source: record.source.clone(),
        };
        Self::new(
            record.name.clone(),
            TargetKind::from_transport(&record.transport),
            settings,
            coordinator,
            request_timeout,
        )
    }

    /// A target backed by a local provider.
    pub fn in_process(
        name: impl Into<String>,
        handler: Arc<dyn McpHandler>,
        tool_prefix: Option<String>,
        request_timeout: Duration,
    ) -> Self {
        let settings = TargetSettings {
            tool_prefix,
            ..TargetSettings::default()
        };
        Self::new(name, TargetKind::InProcess(handler), settings, None, request_timeout)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &TargetKind {
        &self.kind
    }

    /// Upstream URL of a network target.
    pub fn url(&self) -> Option<&str> {
        match &self.kind {
            TargetKind::Network { url, .. } => Some(url),
            _ => None,
        }
    }

    pub async fn status(&self) -> TargetStatus {
        self.state.read().await.status
    }

    pub async fn state(&self) -> TargetState {
        self.state.read().await.clone()
    }

    pub async fn settings(&self) -> TargetSettings {
        self.settings.read().await.clone()
    }

    pub async fn is_disabled(&self) -> bool {
        self.settings.read().await.disabled
    }

    /// Whether the target takes part in listings and routing.
    pub async fn is_live(&self) -> bool {
        !self.is_disabled().await && self.status().await == TargetStatus::Connected
    }

    /// Apply (or lift) the workspace-wide `<name>__` prefix policy.
    pub fn set_auto_prefix(&self, enabled: bool) {
        self.auto_prefix.store(enabled, Ordering::SeqCst);
    }

    /// Prefix prepended to this target's tool names, if any.
    pub async fn effective_prefix(&self) -> Option<String> {
        let settings = self.settings.read().await;
        self.prefix_for(&settings)
    }

    fn prefix_for(&self, settings: &TargetSettings) -> Option<String> {
        match &settings.tool_prefix {
            Some(prefix) if !prefix.is_empty() => Some(prefix.clone()),
            _ if self.auto_prefix.load(Ordering::SeqCst) => {
                Some(format!("{}{PREFIX_SEPARATOR}", self.name))
            }
            _ => None,
        }
    }

    /// Establish the transport and run the MCP handshake.
    ///
    /// With `throw_on_error` a failure is returned as an error; otherwise it
    /// is reported as [`ConnectOutcome::Failed`]. A network target that needs
    /// OAuth and has a coordinator ends as [`ConnectOutcome::Unauthorized`]
    /// either way.
    pub async fn connect(&self, throw_on_error: bool) -> GatewayResult<ConnectOutcome> {
        let _guard = self.connect_lock.lock().await;
        self.drop_client().await;

        match self.open().await {
            Ok(Opened::Client(client)) => {
                *self.client.write().await = Some(Arc::new(client));
                let mut state = self.state.write().await;
                state.status = TargetStatus::Connected;
                state.last_connected_at = Some(Utc::now());
                state.last_error = None;
                info!(target_name = %self.name, kind = self.kind.label(), "Target connected");
                Ok(ConnectOutcome::Connected)
            }
            Ok(Opened::Unauthorized(message)) => {
                let mut state = self.state.write().await;
                state.status = TargetStatus::Unauthorized;
                state.last_error = Some(message);
                info!(target_name = %self.name, "Target waiting for authorization");
                Ok(ConnectOutcome::Unauthorized)
            }
            Err(e) => {
                let message = e.to_string();
                {
                    let mut state = self.state.write().await;
                    state.status = if matches!(e, GatewayError::Unauthorized(_)) {
                        TargetStatus::Unauthorized
                    } else {
                        TargetStatus::Error
                    };
                    state.last_error = Some(message.clone());
                }
                warn!(target_name = %self.name, error = %message, "Target failed to connect");
                if throw_on_error {
                    Err(e)
                } else {
                    Ok(ConnectOutcome::Failed(message))
                }
            }
        }
    }

    async fn open(&self) -> GatewayResult<Opened> {
        match &self.kind {
            TargetKind::Process(config) => self.open_process(config).await.map(Opened::Client),
            TargetKind::InProcess(handler) => {
                let transport = Arc::new(MemoryTransport::linked(handler.clone()));
                let client =
                    McpClient::connect(self.name.clone(), transport, self.options.clone()).await?;
                Ok(Opened::Client(client))
            }
            TargetKind::Network {
                url,
                headers,
                oauth,
            } => self.open_network(url, headers, *oauth).await,
        }
    }

    async fn open_process(&self, config: &StdioConfig) -> GatewayResult<McpClient> {
        let failed = || {
            GatewayError::ConnectionRefused(format!(
                "failed to run '{}'. Please check the logs for more details.",
                config.command_line()
            ))
        };

        let transport = match StdioTransport::spawn(config) {
            Ok(transport) => transport,
            Err(McpError::CommandNotFound(_)) => {
                return Err(GatewayError::ConnectionRefused(format!(
                    "command not found: '{}'. Please make sure it is installed and available in $PATH",
                    config.command
                )));
            }
            Err(e) => {
                warn!(target_name = %self.name, error = %e, "Failed to spawn server");
                return Err(failed());
            }
        };

        McpClient::connect(self.name.clone(), Arc::new(transport), self.options.clone())
            .await
            .map_err(|e| {
                warn!(target_name = %self.name, error = %e, "Server handshake failed");
                failed()
            })
    }

    async fn open_network(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        oauth: bool,
    ) -> GatewayResult<Opened> {
        let auth_token = match &self.coordinator {
            Some(coordinator) if oauth => coordinator.access_token(url).await,
            _ => None,
        };
        let config = HttpConfig {
            url: url.to_string(),
            headers: headers.clone(),
            auth_token,
            timeout_secs: self.options.request_timeout.as_secs().max(1),
        };

        let streamable = Arc::new(StreamableTransport::new(config.clone())?);
        match McpClient::connect(self.name.clone(), streamable, self.options.clone()).await {
            Ok(client) => return Ok(Opened::Client(client)),
            Err(e) if e.is_auth_required() => return self.authorization_required(url, oauth).await,
            Err(e) => {
                debug!(target_name = %self.name, error = %e, "Streamable HTTP failed, trying SSE");
            }
        }

        let legacy = match LegacySseTransport::connect(config).await {
            Ok(transport) => {
                McpClient::connect(self.name.clone(), Arc::new(transport), self.options.clone())
                    .await
            }
            Err(e) => Err(e),
        };

        match legacy {
            Ok(client) => Ok(Opened::Client(client)),
            Err(e) if e.is_auth_required() => self.authorization_required(url, oauth).await,
            Err(e) => Err(GatewayError::ConnectionRefused(format!(
                "failed to connect to '{}' at {url}: {e}",
                self.name
            ))),
        }
    }

    async fn authorization_required(&self, url: &str, oauth: bool) -> GatewayResult<Opened> {
        let coordinator = match &self.coordinator {
            Some(coordinator) if oauth => coordinator,
            _ => {
                return Err(GatewayError::Unauthorized(format!(
                    "'{}' at {url} requires authorization",
                    self.name
                )))
            }
        };

        match coordinator.begin(url).await {
            Ok(authorization_url) => Ok(Opened::Unauthorized(format!(
                "Authorization required. Visit {authorization_url}"
            ))),
            Err(e) => {
                warn!(target_name = %self.name, error = %e, "Could not start authorization");
                Ok(Opened::Unauthorized(format!("Authorization required: {e}")))
            }
        }
    }

    async fn drop_client(&self) {
        let client = self.client.write().await.take();
        if let Some(client) = client {
            if let Err(e) = client.close().await {
                debug!(target_name = %self.name, error = %e, "Error closing transport");
            }
        }
    }

    /// Tear down the transport. Only a connected target becomes disconnected;
    /// unauthorized and error stay until the next successful connect.
    pub async fn close(&self) {
        let _guard = self.connect_lock.lock().await;
        self.drop_client().await;
        let mut state = self.state.write().await;
        if state.status == TargetStatus::Connected {
            state.status = TargetStatus::Disconnected;
        }
    }

    /// Finish OAuth with `code` through the shared registration, then reconnect.
    pub async fn complete_auth_flow(&self, code: &str) -> GatewayResult<ConnectOutcome> {
        let (Some(url), Some(coordinator)) = (self.url(), &self.coordinator) else {
            return Err(GatewayError::BadRequest(format!(
                "'{}' does not use OAuth",
                self.name
            )));
        };

        coordinator.register(url).await.complete(code).await?;
        self.connect(true).await
    }

    async fn client(&self) -> GatewayResult<Arc<McpClient>> {
        self.client.read().await.clone().ok_or_else(|| {
            GatewayError::ConnectionRefused(format!("'{}' is not connected", self.name))
        })
    }

    /// Tools with disabled ones dropped and the prefix applied.
    pub async fn list_tools(&self) -> GatewayResult<Vec<McpTool>> {
        let tools = self.client().await?.list_tools().await?;
        let settings = self.settings.read().await;
        let prefix = self.prefix_for(&settings);

        Ok(tools
            .into_iter()
            .filter(|tool| !settings.disabled_tools.contains(&tool.name))
            .map(|mut tool| {
                if let Some(prefix) = &prefix {
                    tool.name = format!("{prefix}{}", tool.name);
                }
                tool
            })
            .collect())
    }

    /// Call a tool by its exposed (prefixed) name.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> GatewayResult<Value> {
        let bare = {
            let settings = self.settings.read().await;
            let bare = match self.prefix_for(&settings) {
                Some(prefix) => name
                    .strip_prefix(prefix.as_str())
                    .ok_or_else(|| GatewayError::unknown("tool", name))?
                    .to_string(),
                None => name.to_string(),
            };
            if settings.disabled_tools.contains(&bare) {
                return Err(GatewayError::ToolDisabled(format!(
                    "Tool '{bare}' is disabled on '{}'",
                    self.name
                )));
            }
            bare
        };

        Ok(self.client().await?.call_tool(&bare, arguments).await?)
    }

    pub async fn list_prompts(&self) -> GatewayResult<Vec<McpPrompt>> {
        Ok(self.client().await?.list_prompts().await?)
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> GatewayResult<Value> {
        Ok(self.client().await?.get_prompt(name, arguments).await?)
    }

    pub async fn list_resources(&self) -> GatewayResult<Vec<McpResource>> {
        Ok(self.client().await?.list_resources().await?)
    }

    pub async fn list_resource_templates(&self) -> GatewayResult<Vec<McpResourceTemplate>> {
        Ok(self.client().await?.list_resource_templates().await?)
    }

    pub async fn read_resource(&self, uri: &str) -> GatewayResult<Value> {
        Ok(self.client().await?.read_resource(uri).await?)
    }

    /// Round-trip check against the upstream.
    pub async fn ping(&self) -> GatewayResult<()> {
        Ok(self.client().await?.ping().await?)
    }

    /// Disabling closes the target; enabling connects it and fails loudly.
    pub async fn set_disabled(&self, disabled: bool) -> GatewayResult<()> {
        self.settings.write().await.disabled = disabled;
        if disabled {
            self.close().await;
        } else {
            self.connect(true).await?;
        }
        Ok(())
    }

    /// Apply a settings patch.
    pub async fn update(&self, patch: TargetPatch) -> GatewayResult<()> {
        let disabled_changed = {
            let mut settings = self.settings.write().await;
            if let Some(prefix) = patch.tool_prefix {
                settings.tool_prefix = Some(prefix).filter(|p| !p.is_empty());
            }
            if let Some(disabled_tools) = patch.disabled_tools {
                settings.disabled_tools = disabled_tools;
            }
            patch.disabled.filter(|d| *d != settings.disabled)
        };

        if let Some(disabled) = disabled_changed {
            self.set_disabled(disabled).await?;
        }
        Ok(())
    }

    pub async fn info(&self) -> TargetInfo {
        let settings = self.settings.read().await.clone();
        let state = self.state.read().await.clone();
        let command = match &self.kind {
            TargetKind::Process(config) => Some(config.command_line()),
            _ => None,
        };

        TargetInfo {
            name: self.name.clone(),
            kind: self.kind.label(),
            url: self.url().map(str::to_string),
            command,
            status: state.status,
            last_connected_at: state.last_connected_at,
            last_error: state.last_error,
            tool_prefix: settings.tool_prefix,
            disabled_tools: settings.disabled_tools,
            disabled: settings.disabled,
            source: settings.source,
        }
    }

    /// Persisted shape; `None` for in-process targets.
    pub async fn to_record(&self) -> Option<ServerRecord> {
        let transport = self.kind.to_transport()?;
        let settings = self.settings.read().await.clone();
        Some(ServerRecord {
            name: self.name.clone(),
            transport,
            tool_prefix: settings.tool_prefix,
            disabled_tools: settings.disabled_tools,
            disabled: settings.disabled,
            source: settings.source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use switchboard_mcp::{JsonRpcError, ServerInfo};

    struct Echo;

    #[async_trait]
    impl McpHandler for Echo {
        fn server_info(&self) -> ServerInfo {
            ServerInfo {
                name: "echo".to_string(),
                version: "1.0.0".to_string(),
            }
        }

        async fn list_tools(&self) -> Result<Vec<McpTool>, JsonRpcError> {
            Ok(vec![
                McpTool::new("echo", "Echo the input", json!({"type": "object"})),
                McpTool::new("ping", "Pong", json!({"type": "object"})),
            ])
        }

        async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<Value, JsonRpcError> {
            match name {
                "echo" => Ok(json!({"content": [{"type": "text", "text": arguments.unwrap_or_default().to_string()}]})),
                "ping" => Ok(json!({"content": [{"type": "text", "text": "pong"}]})),
                other => Err(JsonRpcError::invalid_params(format!("Unknown tool: {other}"))),
            }
        }
    }

    fn echo_target(prefix: Option<&str>) -> Target {
        Target::in_process(
            "echo",
            Arc::new(Echo),
            prefix.map(str::to_string),
            Duration::from_secs(5),
        )
    }

    fn tool_names(tools: &[McpTool]) -> Vec<&str> {
        tools.iter().map(|t| t.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_not_connected_on_construction() {
        let target = echo_target(None);
        assert_eq!(target.status().await, TargetStatus::Disconnected);
        let error = target.list_tools().await.unwrap_err();
        assert_eq!(error.code(), "CONNECTION_REFUSED");
    }

    #[tokio::test]
    async fn test_connect_and_close() {
        let target = echo_target(None);
        let outcome = target.connect(true).await.unwrap();
        assert_eq!(outcome, ConnectOutcome::Connected);

        let state = target.state().await;
        assert_eq!(state.status, TargetStatus::Connected);
        assert!(state.last_connected_at.is_some());
        assert!(state.last_error.is_none());

        target.close().await;
        assert_eq!(target.status().await, TargetStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_prefixed_tools() {
        let target = echo_target(Some("p__"));
        target.connect(true).await.unwrap();

        let tools = target.list_tools().await.unwrap();
        assert_eq!(tool_names(&tools), vec!["p__echo", "p__ping"]);

        let error = target.call_tool("echo", None).await.unwrap_err();
        assert_eq!(error.to_string(), "Unknown tool: echo");

        let prefixed = target.call_tool("p__echo", Some(json!({"a": 1}))).await.unwrap();
        let unprefixed = echo_target(None);
        unprefixed.connect(true).await.unwrap();
        let plain = unprefixed.call_tool("echo", Some(json!({"a": 1}))).await.unwrap();
        assert_eq!(prefixed, plain);
    }

    #[tokio::test]
    async fn test_auto_prefix_yields_to_explicit_prefix() {
        let target = echo_target(None);
        target.set_auto_prefix(true);
        assert_eq!(target.effective_prefix().await.as_deref(), Some("echo__"));

        target
            .update(TargetPatch {
                tool_prefix: Some("x_".to_string()),
                ..TargetPatch::default()
            })
            .await
            .unwrap();
        assert_eq!(target.effective_prefix().await.as_deref(), Some("x_"));

        target
            .update(TargetPatch {
                tool_prefix: Some(String::new()),
                ..TargetPatch::default()
            })
            .await
            .unwrap();
        assert_eq!(target.effective_prefix().await.as_deref(), Some("echo__"));
    }

    #[tokio::test]
    async fn test_disabled_tools() {
        let target = echo_target(None);
        target.connect(true).await.unwrap();
        target
            .update(TargetPatch {
                disabled_tools: Some(vec!["ping".to_string()]),
                ..TargetPatch::default()
            })
            .await
            .unwrap();

        let tools = target.list_tools().await.unwrap();
        assert_eq!(tool_names(&tools), vec!["echo"]);

        let error = target.call_tool("ping", None).await.unwrap_err();
        assert_eq!(error.code(), "TOOL_DISABLED");
        assert!(target.call_tool("echo", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_set_disabled_closes_and_reconnects() {
        let target = echo_target(None);
        target.connect(true).await.unwrap();

        target.set_disabled(true).await.unwrap();
        assert!(target.is_disabled().await);
        assert_eq!(target.status().await, TargetStatus::Disconnected);
        assert!(!target.is_live().await);

        target.set_disabled(false).await.unwrap();
        assert!(target.is_live().await);
    }

    #[tokio::test]
    async fn test_missing_command() {
        let record = ServerRecord::stdio("ghost", "switchboard-no-such-binary", vec![]);
        let target = Target::from_record(&record, None, Duration::from_secs(5));

        let error = target.connect(true).await.unwrap_err();
        assert_eq!(error.code(), "CONNECTION_REFUSED");
        assert!(error.to_string().contains("command not found"));

        let state = target.state().await;
        assert_eq!(state.status, TargetStatus::Error);
        assert!(state.last_connected_at.is_none());
        assert!(state.last_error.unwrap().contains("switchboard-no-such-binary"));

        // Error is sticky across close
        target.close().await;
        assert_eq!(target.status().await, TargetStatus::Error);
    }

    #[tokio::test]
    async fn test_failure_without_throw() {
        let record = ServerRecord::stdio("ghost", "switchboard-no-such-binary", vec![]);
        let target = Target::from_record(&record, None, Duration::from_secs(5));
        let outcome = target.connect(false).await.unwrap();
        assert!(matches!(outcome, ConnectOutcome::Failed(m) if m.contains("command not found")));
    }

    #[tokio::test]
    async fn test_record_roundtrip_keeps_settings() {
        let mut record = ServerRecord::http("remote", "https://mcp.example.com/mcp");
        record.tool_prefix = Some("r__".to_string());
        record.disabled_tools = vec!["delete".to_string()];
        record.source = Some("registry:remote".to_string());

        let target = Target::from_record(&record, None, Duration::from_secs(5));
        assert_eq!(target.kind().label(), "network");
        assert_eq!(target.url(), Some("https://mcp.example.com/mcp"));
        assert_eq!(target.to_record().await, Some(record));

        assert!(echo_target(None).to_record().await.is_none());
    }
}
