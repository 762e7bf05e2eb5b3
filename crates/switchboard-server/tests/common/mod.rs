//! Shared helpers for the front-end integration tests.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, Response};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::{GatewaySettings, OAuthCoordinator, WorkspaceStore};
use switchboard_server::AppState;
use switchboard_storage::{MemoryConfigStore, PromptMessageRecord, PromptRecord};

pub fn settings() -> GatewaySettings {
    GatewaySettings {
        request_timeout: Duration::from_secs(10),
        enable_controller: true,
        ..GatewaySettings::default()
    }
}

/// A store with one workspace, `dev`, holding the `greet` prompt.
pub async fn state() -> AppState {
    let store = WorkspaceStore::bootstrap(
        Arc::new(MemoryConfigStore::new()),
        Arc::new(OAuthCoordinator::new(
            "http://127.0.0.1:3282/oauth/callback",
        )),
        settings(),
    )
    .await
    .expect("Failed to bootstrap store");

    store
        .create("dev", None)
        .await
        .expect("Failed to create workspace");
    store
        .add_prompt("dev", greet())
        .await
        .expect("Failed to add prompt");

    AppState::new(Arc::new(store))
}

pub fn greet() -> PromptRecord {
    PromptRecord {
        name: "greet".to_string(),
        description: Some("Say hello".to_string()),
        arguments: Vec::new(),
        messages: vec![PromptMessageRecord {
            role: "user".to_string(),
            text: "Hello {{who}}".to_string(),
        }],
    }
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("Failed to build request")
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("Failed to build request")
}

/// Collect a finite response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

/// Serve the router on an ephemeral port and return its base URL.
pub async fn spawn(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to read address");
    let app = switchboard_server::create_router(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}
