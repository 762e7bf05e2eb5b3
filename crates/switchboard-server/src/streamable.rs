//! Streaming-HTTP session adapter.
//!
//! `POST /{proxy_id}/mcp` carries JSON-RPC messages and answers them in the
//! response body. The first `initialize` creates a session whose id travels
//! in the `mcp-session-id` header from then on. `GET` holds an event stream
//! open for the session and `DELETE` terminates it.

use crate::error::ApiError;
use crate::rpc;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use std::time::{Duration, Instant};
use switchboard_mcp::SESSION_HEADER;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// JSON-RPC server error code used for session failures.
const SESSION_ERROR: i64 = -32000;

struct StreamableSession {
    proxy_id: String,
    /// Cancelled on termination; ends open `GET` streams.
    closed: CancellationToken,
    created_at: Instant,
}

/// Streaming-HTTP sessions, keyed by session id.
#[derive(Default)]
pub struct StreamableSessions {
    sessions: RwLock<HashMap<String, StreamableSession>>,
}

impl StreamableSessions {
    async fn create(&self, proxy_id: &str) -> String {
        let session_id = uuid::Uuid::new_v4().to_string();
        self.sessions.write().await.insert(
            session_id.clone(),
            StreamableSession {
                proxy_id: proxy_id.to_string(),
                closed: CancellationToken::new(),
                created_at: Instant::now(),
            },
        );
        info!(proxy_id = %proxy_id, session_id = %session_id, "Streamable session created");
        session_id
    }

    /// Termination token of a session, if it belongs to `proxy_id`.
    async fn token(&self, proxy_id: &str, session_id: &str) -> Option<CancellationToken> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .filter(|s| s.proxy_id == proxy_id)
            .map(|s| s.closed.clone())
    }

    async fn terminate(&self, proxy_id: &str, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        if !sessions.get(session_id).is_some_and(|s| s.proxy_id == proxy_id) {
            return false;
        }
        if let Some(session) = sessions.remove(session_id) {
            session.closed.cancel();
            info!(
                session_id = %session_id,
                age = ?session.created_at.elapsed(),
                "Streamable session terminated"
            );
        }
        true
    }

    pub(crate) async fn evict_proxy(&self, proxy_id: &str) {
        self.sessions.write().await.retain(|_, s| {
            let keep = s.proxy_id != proxy_id;
            if !keep {
                s.closed.cancel();
            }
            keep
        });
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|id| !id.is_empty())
}

fn no_session() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(rpc::error_value(
            Value::Null,
            SESSION_ERROR,
            "Bad Request: No valid session ID provided",
        )),
    )
        .into_response()
}

/// `POST /{proxy_id}/mcp`
pub(crate) async fn post(
    State(state): State<AppState>,
    Path(proxy_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let workspace = match state.store.get(&proxy_id).await {
        Ok(workspace) => workspace,
        Err(e) => return ApiError::gateway(e).into_response(),
    };

    let message = match rpc::parse_body(&body) {
        Ok(message) => message,
        Err(error) => return (StatusCode::BAD_REQUEST, Json(error)).into_response(),
    };

    let sessions = &state.streamable_sessions;
    let known = match session_header(&headers) {
        Some(id) if sessions.token(&proxy_id, id).await.is_some() => Some(id.to_string()),
        _ => None,
    };
    let session_id = match known {
        Some(id) => id,
        None if rpc::is_initialize(&message) => sessions.create(&proxy_id).await,
        None => return no_session(),
    };

    debug!(proxy_id = %proxy_id, session_id = %session_id, "Received streamable message");
    let header = [(SESSION_HEADER, session_id)];
    match rpc::dispatch(&*workspace, message).await {
        Some(reply) => (header, Json(reply)).into_response(),
        None => (StatusCode::ACCEPTED, header).into_response(),
    }
}

/// `GET /{proxy_id}/mcp`
pub(crate) async fn get(
    State(state): State<AppState>,
    Path(proxy_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = state.store.get(&proxy_id).await {
        return ApiError::gateway(e).into_response();
    }

    let token = match session_header(&headers) {
        Some(id) => state.streamable_sessions.token(&proxy_id, id).await,
        None => None,
    };
    let Some(token) = token else {
        return no_session();
    };

    // Nothing is pushed server-side; the stream only signals liveness.
    let stream = async_stream::stream! {
        yield Ok::<_, Infallible>(Event::default().comment("open"));
        token.cancelled().await;
    };

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("ping"),
        )
        .into_response()
}

/// `DELETE /{proxy_id}/mcp`
pub(crate) async fn delete(
    State(state): State<AppState>,
    Path(proxy_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = state.store.get(&proxy_id).await {
        return ApiError::gateway(e).into_response();
    }

    match session_header(&headers) {
        Some(id) if state.streamable_sessions.terminate(&proxy_id, id).await => {
            StatusCode::OK.into_response()
        }
        _ => no_session(),
    }
}
