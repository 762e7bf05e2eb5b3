//! Persisted workspace records.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A persisted workspace: the aggregate server exposed at `/{id}/...`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Prefix every target's tools with `<target>__`.
    #[serde(default)]
    pub add_tool_prefix: bool,
    #[serde(default)]
    pub servers: Vec<ServerRecord>,
    #[serde(default)]
    pub prompts: Vec<PromptRecord>,
}

impl WorkspaceRecord {
    /// Create an empty workspace record.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            add_tool_prefix: false,
            servers: Vec::new(),
            prompts: Vec::new(),
        }
    }

    /// Check the record for problems that would make it unloadable.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("workspace id must not be empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Err(format!("workspace '{}' has an empty name", self.id));
        }

        let mut seen = HashSet::new();
        for server in &self.servers {
            if server.name.trim().is_empty() {
                return Err(format!("workspace '{}' has a server with no name", self.id));
            }
            if !seen.insert(server.name.to_lowercase()) {
                return Err(format!(
                    "workspace '{}' has duplicate server name '{}'",
                    self.id, server.name
                ));
            }
            server.transport.validate(&server.name)?;
        }

        let mut prompt_names = HashSet::new();
        for prompt in &self.prompts {
            if prompt.name.trim().is_empty() {
                return Err(format!("workspace '{}' has a prompt with no name", self.id));
            }
            if !prompt_names.insert(prompt.name.as_str()) {
                return Err(format!(
                    "workspace '{}' has duplicate prompt '{}'",
                    self.id, prompt.name
                ));
            }
        }
        Ok(())
    }
}

/// A persisted upstream server of a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    pub name: String,
    pub transport: TransportRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_tools: Vec<String>,
    #[serde(default)]
    pub disabled: bool,
    /// Provenance tag, e.g. `registry:github`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ServerRecord {
    /// A server launched as a subprocess.
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self::with_transport(
            name,
            TransportRecord::Stdio {
                command: command.into(),
                args,
                env: HashMap::new(),
            },
        )
    }

    /// A server reached over HTTP, with OAuth allowed.
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::with_transport(
            name,
            TransportRecord::Http {
                url: url.into(),
                headers: HashMap::new(),
                oauth: true,
            },
        )
    }

    fn with_transport(name: impl Into<String>, transport: TransportRecord) -> Self {
        Self {
            name: name.into(),
            transport,
            tool_prefix: None,
            disabled_tools: Vec::new(),
            disabled: false,
            source: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// How to reach a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportRecord {
    /// Subprocess speaking newline-delimited JSON-RPC over stdio.
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Streamable HTTP endpoint, with legacy SSE fallback.
    Http {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default = "default_true")]
        oauth: bool,
    },
}

impl TransportRecord {
    /// Short name of the transport kind.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportRecord::Stdio { .. } => "stdio",
            TransportRecord::Http { .. } => "http",
        }
    }

    /// Check the descriptor of the server named `server`.
    pub fn validate(&self, server: &str) -> Result<(), String> {
        match self {
            TransportRecord::Stdio { command, .. } => {
                if command.trim().is_empty() {
                    return Err(format!("server '{server}' has an empty command"));
                }
            }
            TransportRecord::Http { url, .. } => {
                let parsed = url::Url::parse(url)
                    .map_err(|e| format!("server '{server}' has an invalid url '{url}': {e}"))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(format!(
                        "server '{server}' url must be http or https, got '{}'",
                        parsed.scheme()
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A prompt stored in a workspace's prompt library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<PromptArgumentRecord>,
    #[serde(default)]
    pub messages: Vec<PromptMessageRecord>,
}

/// A declared prompt argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptArgumentRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// A prompt message template. `{{argument}}` placeholders are substituted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessageRecord {
    pub role: String,
    pub text: String,
}

/// Which workspace an installer client is pointed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientLink {
    pub client: String,
    pub workspace_id: String,
}
