//! Error bodies for the HTTP surface.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use switchboard_core::GatewayError;

/// JSON error body: `{"error": "...", "code": "NOT_FOUND"}`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

/// Result type for handlers.
pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

impl ApiError {
    fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::NOT_FOUND, Json(Self::new(msg, "NOT_FOUND")))
    }

    pub fn bad_request(msg: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::BAD_REQUEST, Json(Self::new(msg, "BAD_REQUEST")))
    }

    pub fn unauthorized(msg: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::UNAUTHORIZED, Json(Self::new(msg, "UNAUTHORIZED")))
    }

    /// Map a gateway error to its status and stable code.
    pub fn gateway(error: GatewayError) -> (StatusCode, Json<Self>) {
        let status = StatusCode::from_u16(error.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(Self::new(error.to_string(), error.code())))
    }
}
