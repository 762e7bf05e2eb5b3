//! OAuth redirect target.
//!
//! Authorization servers send the browser to `GET /oauth/callback` with the
//! code and the state issued when the flow began. The state identifies the
//! upstream URL; the coordinator then exchanges the code and reconnects every
//! target using that URL.

use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
};
use serde::Deserialize;
use tracing::{info, warn};

const HTML_SUCCESS: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Switchboard - Authorization Successful</title>
  <style>
    body { font-family: system-ui, -apple-system, sans-serif; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0; background: #1a1a2e; color: #eee; }
    .container { text-align: center; padding: 2rem; }
    h1 { color: #4ade80; margin-bottom: 1rem; }
    p { color: #aaa; }
  </style>
</head>
<body>
  <div class="container">
    <h1>Authorization Successful</h1>
    <p>You can close this window. Connected servers: {connected}</p>
  </div>
  <script>setTimeout(() => window.close(), 2000);</script>
</body>
</html>"#;

fn html_success(connected: usize) -> String {
    HTML_SUCCESS.replace("{connected}", &connected.to_string())
}

fn html_error(error: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <title>Switchboard - Authorization Failed</title>
  <style>
    body {{ font-family: system-ui, -apple-system, sans-serif; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0; background: #1a1a2e; color: #eee; }}
    .container {{ text-align: center; padding: 2rem; }}
    h1 {{ color: #f87171; margin-bottom: 1rem; }}
    .error {{ color: #fca5a5; font-family: monospace; margin-top: 1rem; padding: 1rem; background: rgba(248,113,113,0.1); border-radius: 0.5rem; }}
  </style>
</head>
<body>
  <div class="container">
    <h1>Authorization Failed</h1>
    <div class="error">{}</div>
  </div>
</body>
</html>"#,
        html_escape(error)
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[derive(Debug, Deserialize)]
pub(crate) struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// `GET /oauth/callback?code=&state=`
pub(crate) async fn oauth_callback(
    State(app): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> (StatusCode, Html<String>) {
    if let Some(error) = query.error {
        let message = match query.error_description {
            Some(description) => format!("{error}: {description}"),
            None => error,
        };
        warn!(error = %message, "Authorization server returned an error");
        return (StatusCode::OK, Html(html_error(&message)));
    }

    let Some(code) = query.code else {
        return (
            StatusCode::BAD_REQUEST,
            Html(html_error("No authorization code provided")),
        );
    };
    let Some(state) = query.state else {
        return (
            StatusCode::BAD_REQUEST,
            Html(html_error("Missing required state parameter")),
        );
    };

    let coordinator = app.coordinator();
    let Some(url) = coordinator.registration_for_state(&state).await else {
        warn!("OAuth callback with unknown state");
        return (
            StatusCode::BAD_REQUEST,
            Html(html_error("Invalid or expired state parameter")),
        );
    };

    match coordinator.on_authorization_success(&url, &code).await {
        Ok(connected) => {
            info!(url = %url, connected, "OAuth callback handled");
            (StatusCode::OK, Html(html_success(connected)))
        }
        Err(e) => {
            warn!(url = %url, error = %e, "OAuth callback failed");
            let status = StatusCode::from_u16(e.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Html(html_error(&e.to_string())))
        }
    }
}
