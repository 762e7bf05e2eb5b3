//! API key authentication for the admin routes.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use subtle::ConstantTimeEq;
use tracing::warn;

/// Extract the API key from request headers.
///
/// `X-API-Key` wins over `Authorization: Bearer <key>`.
pub(crate) fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key);
    }

    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(str::trim)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Reject requests without the configured key. No key configured, no check.
pub(crate) async fn api_key_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ApiError>)> {
    let Some(expected) = state.api_key() else {
        return Ok(next.run(request).await);
    };

    match extract_api_key(request.headers()) {
        Some(key) if constant_time_eq(key.as_bytes(), expected.as_bytes()) => {
            Ok(next.run(request).await)
        }
        Some(_) => {
            warn!(path = %request.uri().path(), "Invalid API key");
            Err(ApiError::unauthorized("Invalid API key"))
        }
        None => {
            warn!(path = %request.uri().path(), "Missing API key");
            Err(ApiError::unauthorized("Authentication required"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_api_key_from_x_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "test-key".parse().unwrap());
        assert_eq!(extract_api_key(&headers), Some("test-key"));
    }

    #[test]
    fn test_extract_api_key_from_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer   my-token  ".parse().unwrap());
        assert_eq!(extract_api_key(&headers), Some("my-token"));
    }

    #[test]
    fn test_extract_api_key_ignores_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Basic abc123".parse().unwrap());
        assert_eq!(extract_api_key(&headers), None);
        assert_eq!(extract_api_key(&HeaderMap::new()), None);
    }

    #[test]
    fn test_x_api_key_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "key-from-header".parse().unwrap());
        headers.insert("authorization", "Bearer key-from-bearer".parse().unwrap());
        assert_eq!(extract_api_key(&headers), Some("key-from-header"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"test", b"test"));
        assert!(!constant_time_eq(b"test", b"wrong"));
        assert!(!constant_time_eq(b"test", b"test-longer"));
        assert!(constant_time_eq(b"", b""));
    }
}
