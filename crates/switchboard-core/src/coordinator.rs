//! Process-wide OAuth state.
//!
//! Every network target pointing at the same upstream URL shares one
//! [`OAuthRegistration`]. The first target hitting an authorization-required
//! response starts the flow; the callback route hands the code to
//! [`OAuthCoordinator::on_authorization_success`], which exchanges it once and
//! reconnects every matching target in every live workspace.

use crate::error::{GatewayError, GatewayResult};
use crate::target::ConnectOutcome;
use crate::workspace::Workspace;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use switchboard_mcp::oauth::{
    prepare_authorization, refresh_tokens, AuthServerMetadata, ClientInfo, OAuthConfig,
    PendingAuthorization, StoredTokens,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Default)]
struct RegistrationState {
    pending: Option<PendingAuthorization>,
    tokens: Option<StoredTokens>,
    client: Option<ClientInfo>,
    metadata: Option<AuthServerMetadata>,
    /// Codes already exchanged. Repeated deliveries are ignored.
    consumed: HashSet<String>,
}

/// Authorization state for one upstream URL.
pub struct OAuthRegistration {
    url: String,
    state: Mutex<RegistrationState>,
}

impl OAuthRegistration {
    fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: Mutex::new(RegistrationState::default()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Start an authorization flow, or return the one already pending.
    ///
    /// Returns the URL the user has to visit.
    pub async fn begin(&self, config: &OAuthConfig) -> GatewayResult<String> {
        let mut state = self.state.lock().await;
        if let Some(pending) = &state.pending {
            return Ok(pending.authorization_url.clone());
        }

        let pending = prepare_authorization(&self.url, config).await?;
        let authorization_url = pending.authorization_url.clone();
        state.pending = Some(pending);
        Ok(authorization_url)
    }

    /// Exchange `code` for tokens.
    ///
    /// Returns `false` when the code was already exchanged earlier.
    pub async fn complete(&self, code: &str) -> GatewayResult<bool> {
        let mut state = self.state.lock().await;
        if state.consumed.contains(code) {
            debug!(url = %self.url, "Authorization code already exchanged");
            return Ok(false);
        }

        let pending = state.pending.as_ref().ok_or_else(|| {
            GatewayError::Unauthorized(format!("No authorization pending for {}", self.url))
        })?;

        let tokens = pending.exchange(code).await?;
        let pending = state.pending.take();
        if let Some(pending) = pending {
            state.client = Some(pending.client);
            state.metadata = Some(pending.metadata);
        }
        state.tokens = Some(StoredTokens::from_tokens(tokens));
        state.consumed.insert(code.to_string());

        info!(url = %self.url, "OAuth authorization completed");
        Ok(true)
    }

    /// A usable access token, refreshed when the stored one has expired.
    pub async fn access_token(&self) -> Option<String> {
        let mut state = self.state.lock().await;
        let tokens = state.tokens.as_ref()?;
        if tokens.is_valid() {
            return Some(tokens.access_token.clone());
        }

        let previous_refresh = tokens.refresh_token.clone();
        let (Some(refresh), Some(metadata), Some(client)) = (
            previous_refresh.clone(),
            state.metadata.clone(),
            state.client.clone(),
        ) else {
            state.tokens = None;
            return None;
        };

        match refresh_tokens(&metadata.token_endpoint, &client, &refresh).await {
            Ok(fresh) => {
                let mut stored = StoredTokens::from_tokens(fresh);
                // Servers may omit the refresh token on refresh
                if stored.refresh_token.is_none() {
                    stored.refresh_token = previous_refresh;
                }
                let access_token = stored.access_token.clone();
                state.tokens = Some(stored);
                debug!(url = %self.url, "Refreshed OAuth token");
                Some(access_token)
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "Token refresh failed");
                state.tokens = None;
                None
            }
        }
    }

    /// Whether tokens have been obtained.
    pub async fn is_authorized(&self) -> bool {
        self.state.lock().await.tokens.is_some()
    }

    /// URL of the pending flow, if one is waiting for the user.
    pub async fn authorization_url(&self) -> Option<String> {
        let state = self.state.lock().await;
        state.pending.as_ref().map(|p| p.authorization_url.clone())
    }

    async fn pending_state(&self) -> Option<String> {
        let state = self.state.lock().await;
        state.pending.as_ref().map(|p| p.state.clone())
    }
}

/// Shared OAuth registry, keyed by upstream URL.
pub struct OAuthCoordinator {
    config: OAuthConfig,
    registrations: RwLock<HashMap<String, Arc<OAuthRegistration>>>,
    workspaces: RwLock<Vec<Weak<Workspace>>>,
}

impl OAuthCoordinator {
    /// `redirect_uri` is where authorization servers send the browser back to.
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self::with_config(OAuthConfig::new(redirect_uri))
    }

    pub fn with_config(config: OAuthConfig) -> Self {
        Self {
            config,
            registrations: RwLock::new(HashMap::new()),
            workspaces: RwLock::new(Vec::new()),
        }
    }

    pub fn redirect_uri(&self) -> &str {
        &self.config.redirect_uri
    }

    /// The registration for `url`, created if missing.
    pub async fn register(&self, url: &str) -> Arc<OAuthRegistration> {
        let key = normalize(url);
        if let Some(existing) = self.registrations.read().await.get(&key) {
            return existing.clone();
        }
        self.registrations
            .write()
            .await
            .entry(key)
            .or_insert_with(|| Arc::new(OAuthRegistration::new(url)))
            .clone()
    }

    pub async fn registration(&self, url: &str) -> Option<Arc<OAuthRegistration>> {
        self.registrations.read().await.get(&normalize(url)).cloned()
    }

    /// Start (or resume) the authorization flow for `url`.
    pub async fn begin(&self, url: &str) -> GatewayResult<String> {
        self.register(url).await.begin(&self.config).await
    }

    /// Current access token for `url`, if authorization has completed.
    pub async fn access_token(&self, url: &str) -> Option<String> {
        match self.registration(url).await {
            Some(registration) => registration.access_token().await,
            None => None,
        }
    }

    /// Upstream URL of the pending flow that issued `state`.
    pub async fn registration_for_state(&self, state: &str) -> Option<String> {
        let registrations: Vec<_> = self.registrations.read().await.values().cloned().collect();
        for registration in registrations {
            if registration.pending_state().await.as_deref() == Some(state) {
                return Some(registration.url.clone());
            }
        }
        None
    }

    /// Make `workspace` visible to authorization callbacks.
    pub async fn track(&self, workspace: &Arc<Workspace>) {
        let mut workspaces = self.workspaces.write().await;
        workspaces.retain(|w| w.strong_count() > 0);
        workspaces.push(Arc::downgrade(workspace));
    }

    /// Exchange `code` for `url` and reconnect every target using it.
    ///
    /// Returns the number of targets that are connected afterwards.
    pub async fn on_authorization_success(&self, url: &str, code: &str) -> GatewayResult<usize> {
        let registration = self
            .registration(url)
            .await
            .ok_or_else(|| GatewayError::NotFound(format!("No authorization flow for {url}")))?;
        registration.complete(code).await?;

        let workspaces: Vec<Arc<Workspace>> = self
            .workspaces
            .read()
            .await
            .iter()
            .filter_map(Weak::upgrade)
            .collect();

        let mut connected = 0;
        for workspace in workspaces {
            for result in workspace.complete_auth_flow(url, code).await {
                match result {
                    Ok(ConnectOutcome::Connected) => connected += 1,
                    Ok(_) => {}
                    Err(e) => warn!(
                        workspace = %workspace.id(),
                        error = %e,
                        "Reconnect after authorization failed"
                    ),
                }
            }
        }

        info!(url = %url, connected, "Authorization delivered");
        Ok(connected)
    }
}

/// Registration key for a server URL: scheme and host lowercased, default
/// port dropped, no trailing slash. Unparseable input is only trimmed.
pub(crate) fn normalize(url: &str) -> String {
    let trimmed = url.trim();
    match Url::parse(trimmed) {
        Ok(parsed) => parsed.as_str().trim_end_matches('/').to_string(),
        Err(_) => trimmed.trim_end_matches('/').to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn auth_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/oauth-authorization-server"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "authorization_endpoint": format!("{}/authorize", server.uri()),
                "token_endpoint": format!("{}/token", server.uri()),
                "registration_endpoint": format!("{}/register", server.uri()),
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/register"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"client_id": "abc"})))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_register_is_shared_per_url() {
        let coordinator = OAuthCoordinator::new("http://localhost/oauth/callback");
        let a = coordinator.register("https://mcp.example.com/mcp").await;
        let b = coordinator.register("https://mcp.example.com/mcp/").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(coordinator.registration("https://other.example.com").await.is_none());
    }

    #[tokio::test]
    async fn test_register_ignores_host_case_and_default_port() {
        let coordinator = OAuthCoordinator::new("http://localhost/oauth/callback");
        let a = coordinator.register("https://MCP.example.com:443/mcp/").await;
        let b = coordinator.register("https://mcp.example.com/mcp").await;
        assert!(Arc::ptr_eq(&a, &b));

        let other_port = coordinator.register("https://mcp.example.com:8443/mcp").await;
        assert!(!Arc::ptr_eq(&a, &other_port));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("HTTP://Example.COM:80/"), "http://example.com");
        assert_eq!(normalize("https://example.com/a/b/"), "https://example.com/a/b");
        assert_eq!(normalize("not a url/"), "not a url");
    }

    #[tokio::test]
    async fn test_begin_reuses_pending_flow() {
        let server = auth_server().await;
        let coordinator = OAuthCoordinator::new("http://localhost/oauth/callback");
        let url = format!("{}/mcp", server.uri());

        let first = coordinator.begin(&url).await.unwrap();
        let second = coordinator.begin(&url).await.unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with(&format!("{}/authorize?", server.uri())));

        let registration = coordinator.registration(&url).await.unwrap();
        let state = registration.pending_state().await.unwrap();
        assert_eq!(coordinator.registration_for_state(&state).await, Some(url));
        assert!(coordinator.registration_for_state("bogus").await.is_none());
    }

    #[tokio::test]
    async fn test_code_exchanged_once() {
        let server = auth_server().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let coordinator = OAuthCoordinator::new("http://localhost/oauth/callback");
        let url = format!("{}/mcp", server.uri());
        coordinator.begin(&url).await.unwrap();

        let registration = coordinator.registration(&url).await.unwrap();
        assert!(registration.complete("code-1").await.unwrap());
        assert!(!registration.complete("code-1").await.unwrap());
        assert!(registration.is_authorized().await);
        assert!(registration.authorization_url().await.is_none());
        assert_eq!(coordinator.access_token(&url).await.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_complete_without_pending_flow() {
        let coordinator = OAuthCoordinator::new("http://localhost/oauth/callback");
        let registration = coordinator.register("https://mcp.example.com").await;
        let error = registration.complete("code").await.unwrap_err();
        assert_eq!(error.code(), "UNAUTHORIZED");

        let error = coordinator
            .on_authorization_success("https://unknown.example.com", "code")
            .await
            .unwrap_err();
        assert_eq!(error.code(), "NOT_FOUND");
    }
}
