//! OAuth support for MCP remote servers.
//!
//! Implements OAuth 2.0 authorization code with PKCE for remote MCP servers:
//! authorization-server metadata discovery, RFC 7591 dynamic client
//! registration, code exchange and token refresh. Where the resulting state
//! lives (and who receives the callback) is up to the caller.

use crate::error::{McpError, McpResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};
use url::Url;

/// Path of the gateway route that receives authorization codes.
pub const OAUTH_CALLBACK_PATH: &str = "/oauth/callback";

/// Tokens are treated as expired this many seconds early.
const EXPIRY_SKEW_SECS: u64 = 60;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth configuration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Pre-registered client ID (optional).
    pub client_id: Option<String>,
    /// Pre-registered client secret (optional).
    pub client_secret: Option<String>,
    /// Requested scopes.
    pub scope: Option<String>,
    /// Where the authorization server sends the browser back to.
    pub redirect_uri: String,
    /// Name used for dynamic registration.
    pub client_name: String,
}

impl OAuthConfig {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: None,
            client_secret: None,
            scope: None,
            redirect_uri: redirect_uri.into(),
            client_name: "Switchboard".to_string(),
        }
    }
}

/// OAuth tokens as returned by the token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Client information (from dynamic registration or config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id_issued_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret_expires_at: Option<u64>,
}

/// Tokens stored with an absolute expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp when token expires.
    pub expires_at: Option<u64>,
    pub scope: Option<String>,
}

impl StoredTokens {
    pub fn from_tokens(tokens: OAuthTokens) -> Self {
        let now = unix_now();
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_in.map(|exp| now + exp),
            scope: tokens.scope,
        }
    }

    /// Whether the access token can still be used.
    pub fn is_valid(&self) -> bool {
        match self.expires_at {
            // Consider expired if less than a minute is left
            Some(expires_at) => expires_at > unix_now() + EXPIRY_SKEW_SECS,
            None => true,
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Authorization server metadata (RFC 8414).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthServerMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
}

impl AuthServerMetadata {
    /// Conventional endpoints at the origin, used when discovery fails.
    fn fallback(origin: &str) -> Self {
        Self {
            issuer: None,
            authorization_endpoint: format!("{origin}/authorize"),
            token_endpoint: format!("{origin}/token"),
            registration_endpoint: Some(format!("{origin}/register")),
            scopes_supported: None,
        }
    }
}

fn http_client() -> McpResult<Client> {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| McpError::auth_failed(format!("Failed to create HTTP client: {e}")))
}

fn origin_of(server_url: &str) -> McpResult<String> {
    let url = Url::parse(server_url)
        .map_err(|e| McpError::auth_failed(format!("Invalid server url '{server_url}': {e}")))?;
    Ok(url.origin().ascii_serialization())
}

/// Discover the authorization server for an MCP server URL.
///
/// Looks at `/.well-known/oauth-authorization-server` on the server's origin
/// and falls back to `/authorize`, `/token` and `/register` there.
pub async fn discover_metadata(server_url: &str) -> McpResult<AuthServerMetadata> {
    let origin = origin_of(server_url)?;
    let well_known = format!("{origin}/.well-known/oauth-authorization-server");

    debug!(url = %well_known, "Discovering OAuth metadata");

    let response = http_client()?
        .get(&well_known)
        .header("Accept", "application/json")
        .send()
        .await;

    match response {
        Ok(response) if response.status().is_success() => {
            match response.json::<AuthServerMetadata>().await {
                Ok(metadata) => return Ok(metadata),
                Err(e) => debug!(error = %e, "Invalid OAuth metadata, using defaults"),
            }
        }
        Ok(response) => debug!(status = %response.status(), "No OAuth metadata, using defaults"),
        Err(e) => debug!(error = %e, "OAuth metadata request failed, using defaults"),
    }

    Ok(AuthServerMetadata::fallback(&origin))
}

/// Client metadata for dynamic registration.
pub fn client_metadata(config: &OAuthConfig) -> Value {
    let auth_method = if config.client_secret.is_some() {
        "client_secret_post"
    } else {
        "none"
    };

    json!({
        "redirect_uris": [config.redirect_uri],
        "client_name": config.client_name,
        "grant_types": ["authorization_code", "refresh_token"],
        "response_types": ["code"],
        "token_endpoint_auth_method": auth_method,
    })
}

/// Register a client dynamically (RFC 7591).
pub async fn register_client(registration_endpoint: &str, config: &OAuthConfig) -> McpResult<ClientInfo> {
    let response = http_client()?
        .post(registration_endpoint)
        .json(&client_metadata(config))
        .send()
        .await
        .map_err(|e| McpError::auth_failed(format!("Client registration failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(McpError::auth_failed(format!(
            "Client registration returned {status}: {text}"
        )));
    }

    let info: ClientInfo = response
        .json()
        .await
        .map_err(|e| McpError::auth_failed(format!("Invalid registration response: {e}")))?;

    info!(client_id = %info.client_id, "Registered OAuth client");
    Ok(info)
}

/// Generate PKCE code verifier.
pub fn generate_code_verifier() -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Generate PKCE code challenge from verifier.
pub fn generate_code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Generate OAuth state parameter.
pub fn generate_state() -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..16).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Build authorization URL.
pub fn build_auth_url(
    auth_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scope: Option<&str>,
    state: &str,
    code_challenge: &str,
) -> String {
    let separator = if auth_endpoint.contains('?') { '&' } else { '?' };
    let mut url = format!(
        "{}{}response_type=code&client_id={}&redirect_uri={}&state={}&code_challenge={}&code_challenge_method=S256",
        auth_endpoint,
        separator,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(state),
        urlencoding::encode(code_challenge),
    );

    if let Some(scope) = scope {
        url.push_str(&format!("&scope={}", urlencoding::encode(scope)));
    }

    url
}

async fn token_request(token_endpoint: &str, params: &[(&str, &str)], what: &str) -> McpResult<OAuthTokens> {
    let response = http_client()?
        .post(token_endpoint)
        .form(params)
        .send()
        .await
        .map_err(|e| McpError::auth_failed(format!("{what} request failed: {e}")))?;

    if !response.status().is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(McpError::auth_failed(format!("{what} failed: {text}")));
    }

    response
        .json()
        .await
        .map_err(|e| McpError::auth_failed(format!("Invalid {what} response: {e}")))
}

/// Exchange authorization code for tokens.
pub async fn exchange_code(
    token_endpoint: &str,
    client: &ClientInfo,
    code: &str,
    redirect_uri: &str,
    code_verifier: &str,
) -> McpResult<OAuthTokens> {
    let mut params = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("client_id", client.client_id.as_str()),
        ("code_verifier", code_verifier),
    ];
    if let Some(secret) = &client.client_secret {
        params.push(("client_secret", secret.as_str()));
    }

    token_request(token_endpoint, &params, "Token exchange").await
}

/// Refresh tokens using refresh token.
pub async fn refresh_tokens(
    token_endpoint: &str,
    client: &ClientInfo,
    refresh_token: &str,
) -> McpResult<OAuthTokens> {
    let mut params = vec![
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", client.client_id.as_str()),
    ];
    if let Some(secret) = &client.client_secret {
        params.push(("client_secret", secret.as_str()));
    }

    token_request(token_endpoint, &params, "Token refresh").await
}

/// An authorization flow waiting for the user to approve it.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub server_url: String,
    /// Where to send the user.
    pub authorization_url: String,
    pub state: String,
    pub code_verifier: String,
    pub redirect_uri: String,
    pub metadata: AuthServerMetadata,
    pub client: ClientInfo,
}

impl PendingAuthorization {
    /// Trade the authorization code for tokens.
    pub async fn exchange(&self, code: &str) -> McpResult<OAuthTokens> {
        exchange_code(
            &self.metadata.token_endpoint,
            &self.client,
            code,
            &self.redirect_uri,
            &self.code_verifier,
        )
        .await
    }
}

/// Discover endpoints, obtain a client and build the authorization URL.
pub async fn prepare_authorization(
    server_url: &str,
    config: &OAuthConfig,
) -> McpResult<PendingAuthorization> {
    let metadata = discover_metadata(server_url).await?;

    let client = match &config.client_id {
        Some(client_id) => ClientInfo {
            client_id: client_id.clone(),
            client_secret: config.client_secret.clone(),
            client_id_issued_at: None,
            client_secret_expires_at: None,
        },
        None => {
            let endpoint = metadata.registration_endpoint.as_deref().ok_or_else(|| {
                McpError::auth_failed("server does not support dynamic client registration")
            })?;
            register_client(endpoint, config).await?
        }
    };

    let code_verifier = generate_code_verifier();
    let state = generate_state();
    let authorization_url = build_auth_url(
        &metadata.authorization_endpoint,
        &client.client_id,
        &config.redirect_uri,
        config.scope.as_deref(),
        &state,
        &generate_code_challenge(&code_verifier),
    );

    info!(server = %server_url, "OAuth authorization required");

    Ok(PendingAuthorization {
        server_url: server_url.to_string(),
        authorization_url,
        state,
        code_verifier,
        redirect_uri: config.redirect_uri.clone(),
        metadata,
        client,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_generate_code_verifier() {
        let verifier = generate_code_verifier();
        // Base64url encoded 32 bytes = 43 characters
        assert_eq!(verifier.len(), 43);
        assert_ne!(verifier, generate_code_verifier());
    }

    #[test]
    fn test_generate_code_challenge() {
        // RFC 7636 appendix B
        let challenge = generate_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_build_auth_url() {
        let url = build_auth_url(
            "https://auth.example.com/authorize",
            "client123",
            "http://localhost:3282/oauth/callback",
            Some("read write"),
            "state123",
            "challenge123",
        );

        assert!(url.starts_with("https://auth.example.com/authorize?response_type=code"));
        assert!(url.contains("client_id=client123"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3282%2Foauth%2Fcallback"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("scope=read%20write"));
    }

    #[test]
    fn test_build_auth_url_existing_query() {
        let url = build_auth_url("https://a.example/auth?tenant=x", "c", "r", None, "s", "ch");
        assert!(url.starts_with("https://a.example/auth?tenant=x&response_type=code"));
        assert!(!url.contains("scope="));
    }

    #[test]
    fn test_stored_tokens_validity() {
        let mut tokens = StoredTokens::from_tokens(OAuthTokens {
            access_token: "a".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
            scope: None,
        });
        assert!(tokens.is_valid());

        tokens.expires_at = Some(unix_now() + 30);
        assert!(!tokens.is_valid());

        tokens.expires_at = None;
        assert!(tokens.is_valid());
    }

    #[test]
    fn test_client_metadata() {
        let config = OAuthConfig::new("http://127.0.0.1:3282/oauth/callback");
        let metadata = client_metadata(&config);
        assert_eq!(metadata["redirect_uris"][0], "http://127.0.0.1:3282/oauth/callback");
        assert_eq!(metadata["token_endpoint_auth_method"], "none");
    }

    #[tokio::test]
    async fn test_discovery_uses_well_known() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/oauth-authorization-server"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": server.uri(),
                "authorization_endpoint": format!("{}/oauth/authorize", server.uri()),
                "token_endpoint": format!("{}/oauth/token", server.uri()),
            })))
            .mount(&server)
            .await;

        let metadata = discover_metadata(&format!("{}/mcp", server.uri())).await.unwrap();
        assert_eq!(metadata.token_endpoint, format!("{}/oauth/token", server.uri()));
        assert!(metadata.registration_endpoint.is_none());
    }

    #[tokio::test]
    async fn test_discovery_falls_back() {
        let server = MockServer::start().await;
        let metadata = discover_metadata(&format!("{}/mcp", server.uri())).await.unwrap();
        assert_eq!(metadata.authorization_endpoint, format!("{}/authorize", server.uri()));
        assert_eq!(metadata.token_endpoint, format!("{}/token", server.uri()));
        assert_eq!(
            metadata.registration_endpoint,
            Some(format!("{}/register", server.uri()))
        );
    }

    #[tokio::test]
    async fn test_prepare_and_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/register"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"client_id": "dyn-client"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code=the-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "token-1",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let config = OAuthConfig::new("http://127.0.0.1:3282/oauth/callback");
        let pending = prepare_authorization(&format!("{}/mcp", server.uri()), &config)
            .await
            .unwrap();
        assert_eq!(pending.client.client_id, "dyn-client");
        assert!(pending.authorization_url.contains("client_id=dyn-client"));
        assert!(pending
            .authorization_url
            .contains(&format!("state={}", urlencoding::encode(&pending.state))));

        let tokens = pending.exchange("the-code").await.unwrap();
        assert_eq!(tokens.access_token, "token-1");
        assert_eq!(tokens.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn test_exchange_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let client = ClientInfo {
            client_id: "c".to_string(),
            client_secret: None,
            client_id_issued_at: None,
            client_secret_expires_at: None,
        };
        let result = exchange_code(&format!("{}/token", server.uri()), &client, "x", "r", "v").await;
        assert!(matches!(result, Err(McpError::AuthFailed(m)) if m.contains("invalid_grant")));
    }
}
