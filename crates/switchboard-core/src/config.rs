//! Gateway configuration.
//!
//! Loading order (later sources override earlier):
//! 1. Built-in defaults
//! 2. The config file (`--config`, or `<config_dir>/switchboard/config.json`)
//! 3. `SWITCHBOARD_*` environment variables
//!
//! Command-line flags are applied on top by the binary.

use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use switchboard_mcp::oauth::OAUTH_CALLBACK_PATH;
use tracing::debug;

/// Default listen address.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:3282";

/// Prefix of the environment variables that override file settings.
pub const ENV_PREFIX: &str = "SWITCHBOARD_";

/// Gateway configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    /// Address the HTTP server binds to.
    pub address: String,
    /// Externally reachable base URL, used for OAuth redirects.
    pub public_url: Option<String>,
    /// Where workspace records are stored.
    pub data_dir: Option<PathBuf>,
    /// Required on `/api` requests when set.
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub connect_concurrency: usize,
    /// Add the `switchboard` controller target to every workspace.
    pub enable_controller: bool,
    /// Base URL of the server registry.
    pub registry_url: Option<String>,
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            public_url: None,
            data_dir: None,
            api_key: None,
            request_timeout_secs: 60,
            connect_concurrency: 8,
            enable_controller: false,
            registry_url: None,
            log_level: "info".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load the config from `path` (or the default location when it exists)
    /// and apply environment overrides.
    ///
    /// Returns the config and the file it was read from, if any.
    pub async fn load(path: Option<&Path>) -> GatewayResult<(Self, Option<PathBuf>)> {
        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => switchboard_util::path::default_config_file()
                .filter(|candidate| candidate.exists()),
        };

        let mut config = match &file {
            Some(file) => Self::load_file(file).await?,
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok((config, file))
    }

    /// Parse a config file.
    pub async fn load_file(path: &Path) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            GatewayError::InvalidConfiguration(format!("cannot read {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Loaded gateway config");
        Self::parse(&content, &path.display().to_string())
    }

    fn parse(content: &str, source: &str) -> GatewayResult<Self> {
        serde_json::from_str(content).map_err(|e| {
            GatewayError::InvalidConfiguration(format!("invalid config at {source}: {e}"))
        })
    }

    /// Apply `SWITCHBOARD_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> GatewayResult<()> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.is_empty());

        if let Some(address) = var("ADDRESS") {
            self.address = address;
        }
        if let Some(url) = var("PUBLIC_URL") {
            self.public_url = Some(url);
        }
        if let Some(dir) = var("DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(key) = var("API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(secs) = var("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_number("REQUEST_TIMEOUT_SECS", &secs)?;
        }
        if let Some(n) = var("CONNECT_CONCURRENCY") {
            self.connect_concurrency = parse_number("CONNECT_CONCURRENCY", &n)?;
        }
        if let Some(flag) = var("ENABLE_CONTROLLER") {
            self.enable_controller = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(url) = var("REGISTRY_URL") {
            self.registry_url = Some(url);
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    /// Base URL the gateway is reachable at from a browser.
    pub fn public_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.address),
        }
    }

    /// Redirect URI registered with OAuth authorization servers.
    pub fn redirect_uri(&self) -> String {
        format!("{}{}", self.public_url(), OAUTH_CALLBACK_PATH)
    }

    /// Configured data directory, or the platform default.
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.data_dir
            .clone()
            .or_else(switchboard_util::path::data_dir)
    }

    /// Runtime settings handed to workspaces.
    pub fn settings(&self) -> GatewaySettings {
        GatewaySettings {
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            connect_concurrency: self.connect_concurrency.max(1),
            enable_controller: self.enable_controller,
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> GatewayResult<T> {
    value.trim().parse().map_err(|_| {
        GatewayError::InvalidConfiguration(format!(
            "{ENV_PREFIX}{name} must be a number, got '{value}'"
        ))
    })
}

/// Settings every workspace and target is built with.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewaySettings {
    /// Bound on every upstream request.
    pub request_timeout: Duration,
    /// Targets connected at once during the initial fan-out.
    pub connect_concurrency: usize,
    pub enable_controller: bool,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        GatewayConfig::default().settings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.address, "127.0.0.1:3282");
        assert_eq!(config.public_url(), "http://127.0.0.1:3282");
        assert_eq!(config.redirect_uri(), "http://127.0.0.1:3282/oauth/callback");

        let settings = config.settings();
        assert_eq!(settings.request_timeout, Duration::from_secs(60));
        assert_eq!(settings.connect_concurrency, 8);
        assert!(!settings.enable_controller);
    }

    #[test]
    fn test_parse_partial_file() {
        let config = GatewayConfig::parse(
            r#"{"address": "0.0.0.0:9000", "publicUrl": "https://gw.example.com/", "enableController": true}"#,
            "test",
        )
        .unwrap();
        assert_eq!(config.address, "0.0.0.0:9000");
        assert_eq!(config.redirect_uri(), "https://gw.example.com/oauth/callback");
        assert!(config.enable_controller);
        assert_eq!(config.request_timeout_secs, 60);
    }

    #[test]
    fn test_parse_invalid_file() {
        let error = GatewayConfig::parse("{not json", "broken.json").unwrap_err();
        assert_eq!(error.code(), "INVALID_CONFIGURATION");
        assert!(error.to_string().contains("broken.json"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SWITCHBOARD_ADDRESS", "0.0.0.0:1"),
            ("SWITCHBOARD_REQUEST_TIMEOUT_SECS", "5"),
            ("SWITCHBOARD_ENABLE_CONTROLLER", "true"),
            ("SWITCHBOARD_API_KEY", ""),
        ]
        .into_iter()
        .collect();

        let mut config = GatewayConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.address, "0.0.0.0:1");
        assert_eq!(config.request_timeout_secs, 5);
        assert!(config.enable_controller);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = GatewayConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "SWITCHBOARD_CONNECT_CONCURRENCY").then(|| "many".to_string())
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{"connectConcurrency": 2}"#)
            .await
            .unwrap();

        let (config, source) = GatewayConfig::load(Some(&path)).await.unwrap();
        assert_eq!(source.as_deref(), Some(path.as_path()));
        assert_eq!(config.settings().connect_concurrency, 2);
    }
}
