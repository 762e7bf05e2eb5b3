//! Server registry client.
//!
//! The registry is a catalog of installable MCP servers. An entry carries a
//! transport template and the parameters a user has to fill in; instantiating
//! it yields an ordinary [`ServerRecord`].

use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use switchboard_storage::{ServerRecord, TransportRecord};
use tracing::debug;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a parameter value ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterScope {
    /// Environment variable of the spawned process.
    Env,
    /// Substituted into (or appended to) the argument list.
    Args,
}

/// A value the user supplies when installing an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryParameter {
    pub name: String,
    pub scope: ParameterScope,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub transport: TransportRecord,
    #[serde(default)]
    pub parameters: Vec<RegistryParameter>,
}

impl RegistryEntry {
    /// Build the server record for `target_name` from user `values`.
    pub fn instantiate(
        &self,
        target_name: &str,
        values: &HashMap<String, String>,
    ) -> GatewayResult<ServerRecord> {
        let mut transport = self.transport.clone();
        let mut unfilled = Vec::new();

        for parameter in &self.parameters {
            let Some(value) = values.get(&parameter.name).filter(|v| !v.is_empty()) else {
                if parameter.required {
                    return Err(GatewayError::BadRequest(format!(
                        "Missing required parameter '{}' for '{}'",
                        parameter.name, self.name
                    )));
                }
                unfilled.push(placeholder(&parameter.name));
                continue;
            };

            match (&mut transport, parameter.scope) {
                (TransportRecord::Stdio { env, .. }, ParameterScope::Env) => {
                    env.insert(parameter.name.clone(), value.clone());
                }
                (TransportRecord::Stdio { args, .. }, ParameterScope::Args) => {
                    let placeholder = placeholder(&parameter.name);
                    if args.iter().any(|arg| arg.contains(&placeholder)) {
                        for arg in args.iter_mut() {
                            *arg = arg.replace(&placeholder, value);
                        }
                    } else {
                        args.push(value.clone());
                    }
                }
                (TransportRecord::Http { headers, .. }, ParameterScope::Env) => {
                    headers.insert(parameter.name.clone(), value.clone());
                }
                (TransportRecord::Http { url, .. }, ParameterScope::Args) => {
                    *url = url.replace(&placeholder(&parameter.name), value);
                }
            }
        }

        // Optional values left out drop the argument that mentions them
        match &mut transport {
            TransportRecord::Stdio { args, .. } => {
                args.retain(|arg| !unfilled.iter().any(|p| arg.contains(p.as_str())));
            }
            TransportRecord::Http { url, .. } => {
                for p in &unfilled {
                    *url = url.replace(p.as_str(), "");
                }
            }
        }

        Ok(ServerRecord {
            name: target_name.to_string(),
            transport,
            tool_prefix: None,
            disabled_tools: Vec::new(),
            disabled: false,
            source: Some(format!("registry:{}", self.name)),
        })
    }
}

fn placeholder(name: &str) -> String {
    format!("{{{{{name}}}}}")
}

/// Lookup of catalog entries.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// `None` when the registry has no entry with that name.
    async fn get_entry_by_name(&self, name: &str) -> GatewayResult<Option<RegistryEntry>>;
}

/// Registry reached over HTTP at `GET {base}/servers/{name}`, with the name
/// percent-encoded as a single path segment.
pub struct HttpRegistryClient {
    base_url: String,
    client: Client,
}

impl HttpRegistryClient {
    pub fn new(base_url: impl Into<String>) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn get_entry_by_name(&self, name: &str) -> GatewayResult<Option<RegistryEntry>> {
        let url = format!("{}/servers/{}", self.base_url, urlencoding::encode(name));
        debug!(url = %url, "Fetching registry entry");

        let response = self.client.get(&url).send().await.map_err(|e| {
            GatewayError::ConnectionRefused(format!("registry unreachable at {url}: {e}"))
        })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(GatewayError::Internal(format!(
                "registry returned {} for '{name}'",
                response.status()
            )));
        }

        let entry = response
            .json::<RegistryEntry>()
            .await
            .map_err(|e| GatewayError::Internal(format!("invalid registry entry '{name}': {e}")))?;
        Ok(Some(entry))
    }
}

/// Fixed set of entries, for tests and offline catalogs.
#[derive(Default)]
pub struct StaticRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl StaticRegistry {
    pub fn new(entries: impl IntoIterator<Item = RegistryEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.name.clone(), e)).collect(),
        }
    }
}

#[async_trait]
impl RegistryClient for StaticRegistry {
    async fn get_entry_by_name(&self, name: &str) -> GatewayResult<Option<RegistryEntry>> {
        Ok(self.entries.get(name).cloned())
    }
}
