//! HTTP front end for switchboard.
//!
//! One axum router serves:
//! - `GET /{proxy_id}/sse`, `POST /{proxy_id}/message`: event-stream sessions
//! - `POST|GET|DELETE /{proxy_id}/mcp`: streaming-HTTP sessions
//! - `GET /oauth/callback`: OAuth redirect target
//! - `/api/...`: admin REST API, optionally behind an API key
//! - `GET /health`

mod auth;
mod callback;
pub mod error;
mod routes;
mod rpc;
pub mod sse;
pub mod state;
pub mod streamable;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    http::{Request, Response},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::time::Duration;
use switchboard_mcp::oauth::OAUTH_CALLBACK_PATH;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, Span};

/// Build the gateway router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([axum::http::HeaderName::from_static(
            switchboard_mcp::SESSION_HEADER,
        )]);

    let api = routes::admin_router();
    let api = if state.has_auth() {
        info!("Admin API key authentication enabled");
        api.layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::api_key_auth,
        ))
    } else {
        api
    };

    Router::new()
        .route("/health", get(health))
        .route(OAUTH_CALLBACK_PATH, get(callback::oauth_callback))
        .nest("/api", api)
        .route("/{proxy_id}/sse", get(sse::connect))
        .route("/{proxy_id}/message", post(sse::message))
        .route(
            "/{proxy_id}/mcp",
            post(streamable::post)
                .get(streamable::get)
                .delete(streamable::delete),
        )
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_response(|response: &Response<_>, latency: Duration, _span: &Span| {
                    info!(status = %response.status(), latency = ?latency, "response");
                }),
        )
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "healthy": true,
        "version": env!("CARGO_PKG_VERSION")
    }))
}
