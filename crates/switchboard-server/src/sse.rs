//! Event-stream session adapter.
//!
//! ```text
//! Client                                 Gateway
//!   │── GET /{proxy_id}/sse ──────────────►│ (register session)
//!   │◄── SSE: endpoint event ──────────────│ (/{proxy_id}/message?sessionId=x)
//!   │── POST /{proxy_id}/message?... ─────►│ (202 Accepted)
//!   │◄── SSE: message event ───────────────│ (JSON-RPC response)
//! ```
//!
//! The session entry lives exactly as long as the stream: dropping the
//! stream evicts it.

use crate::error::ApiError;
use crate::rpc;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

struct SseSession {
    proxy_id: String,
    sender: mpsc::UnboundedSender<Value>,
}

/// Open event streams, keyed by session id.
#[derive(Default)]
pub struct SseSessions {
    sessions: RwLock<HashMap<String, SseSession>>,
}

impl SseSessions {
    async fn register(&self, proxy_id: &str) -> (String, mpsc::UnboundedReceiver<Value>) {
        let session_id = uuid::Uuid::new_v4().to_string();
        let (sender, receiver) = mpsc::unbounded_channel();
        self.sessions.write().await.insert(
            session_id.clone(),
            SseSession {
                proxy_id: proxy_id.to_string(),
                sender,
            },
        );
        info!(proxy_id = %proxy_id, session_id = %session_id, "SSE session registered");
        (session_id, receiver)
    }

    async fn unregister(&self, session_id: &str) {
        if self.sessions.write().await.remove(session_id).is_some() {
            info!(session_id = %session_id, "SSE session closed");
        }
    }

    /// Response channel of a session, if it belongs to `proxy_id`.
    async fn sender(&self, proxy_id: &str, session_id: &str) -> Option<mpsc::UnboundedSender<Value>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .filter(|s| s.proxy_id == proxy_id)
            .map(|s| s.sender.clone())
    }

    pub(crate) async fn evict_proxy(&self, proxy_id: &str) {
        self.sessions.write().await.retain(|_, s| s.proxy_id != proxy_id);
    }

    /// Number of open sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Evicts its session when the stream owning it is dropped.
struct SessionGuard {
    sessions: Arc<SseSessions>,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let sessions = self.sessions.clone();
        let session_id = std::mem::take(&mut self.session_id);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { sessions.unregister(&session_id).await });
        }
    }
}

/// `GET /{proxy_id}/sse`
pub(crate) async fn connect(
    State(state): State<AppState>,
    Path(proxy_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, Json<ApiError>)> {
    state.store.get(&proxy_id).await.map_err(ApiError::gateway)?;

    let (session_id, mut receiver) = state.sse_sessions.register(&proxy_id).await;
    let endpoint = format!("/{proxy_id}/message?sessionId={session_id}");
    let guard = SessionGuard {
        sessions: state.sse_sessions.clone(),
        session_id,
    };

    let stream = async_stream::stream! {
        let _guard = guard;
        // Plain URL, not JSON
        yield Ok(Event::default().event("endpoint").data(endpoint));

        while let Some(message) = receiver.recv().await {
            match serde_json::to_string(&message) {
                Ok(data) => yield Ok(Event::default().event("message").data(data)),
                Err(e) => warn!(error = %e, "Failed to serialize SSE message"),
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

#[derive(Deserialize)]
pub(crate) struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// `POST /{proxy_id}/message?sessionId=`
pub(crate) async fn message(
    State(state): State<AppState>,
    Path(proxy_id): Path<String>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    let workspace = match state.store.get(&proxy_id).await {
        Ok(workspace) => workspace,
        Err(e) => return ApiError::gateway(e).into_response(),
    };

    let Some(session_id) = query.session_id.filter(|id| !id.is_empty()) else {
        return ApiError::bad_request("Missing sessionId parameter").into_response();
    };
    let Some(sender) = state.sse_sessions.sender(&proxy_id, &session_id).await else {
        warn!(proxy_id = %proxy_id, session_id = %session_id, "Message for unknown session");
        return ApiError::not_found(format!("Unknown session: {session_id}")).into_response();
    };

    let message = match rpc::parse_body(&body) {
        Ok(message) => message,
        Err(error) => return (StatusCode::BAD_REQUEST, Json(error)).into_response(),
    };

    debug!(proxy_id = %proxy_id, session_id = %session_id, "Received SSE message");
    tokio::spawn(async move {
        if let Some(reply) = rpc::dispatch(&*workspace, message).await {
            if sender.send(reply).is_err() {
                debug!(session_id = %session_id, "Session closed before the response was sent");
            }
        }
    });

    (StatusCode::ACCEPTED, "Accepted").into_response()
}
