//! Server state.

use crate::sse::SseSessions;
use crate::streamable::StreamableSessions;
use std::sync::Arc;
use switchboard_core::{OAuthCoordinator, WorkspaceStore};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Live workspaces.
    pub store: Arc<WorkspaceStore>,
    /// Sessions of the event-stream adapter.
    pub sse_sessions: Arc<SseSessions>,
    /// Sessions of the streaming-HTTP adapter.
    pub streamable_sessions: Arc<StreamableSessions>,
    /// When set, `/api` requires this key in `X-API-Key` or
    /// `Authorization: Bearer <key>`.
    api_key: Option<String>,
}

impl AppState {
    pub fn new(store: Arc<WorkspaceStore>) -> Self {
        Self {
            store,
            sse_sessions: Arc::new(SseSessions::default()),
            streamable_sessions: Arc::new(StreamableSessions::default()),
            api_key: None,
        }
    }

    /// Require `key` on the admin routes. Empty keys are ignored.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn has_auth(&self) -> bool {
        self.api_key.is_some()
    }

    pub(crate) fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn coordinator(&self) -> &Arc<OAuthCoordinator> {
        self.store.coordinator()
    }

    /// Drop every front-end session bound to workspace `proxy_id`.
    pub async fn evict_sessions(&self, proxy_id: &str) {
        self.sse_sessions.evict_proxy(proxy_id).await;
        self.streamable_sessions.evict_proxy(proxy_id).await;
    }
}
