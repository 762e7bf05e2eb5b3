//! Admin API, API key and OAuth callback tests.

mod common;

use common::{body_json, empty_request, greet, json_request, state};
use serde_json::json;
use switchboard_server::create_router;
use tower::ServiceExt;

#[tokio::test]
async fn test_health() {
    let app = create_router(state().await);
    let response = app
        .oneshot(empty_request("GET", "/health"))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 200);
    assert_eq!(body_json(response).await["healthy"], true);
}

/// Workspace create, read, update and delete.
#[tokio::test]
async fn test_workspace_crud() {
    let app = create_router(state().await);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/workspaces",
            json!({"name": "My Tools", "description": "scratch"}),
        ))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 201);
    let created = body_json(response).await;
    assert_eq!(created["id"], "my-tools");

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/workspaces"))
        .await
        .expect("Failed to send");
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(2));

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            "/api/workspaces/my-tools",
            json!({"name": "Renamed"}),
        ))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 200);
    assert_eq!(body_json(response).await["name"], "Renamed");

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", "/api/workspaces/my-tools"))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 200);

    let response = app
        .oneshot(empty_request("GET", "/api/workspaces/my-tools"))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 404);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_create_rejects_empty_name() {
    let app = create_router(state().await);
    let response = app
        .oneshot(json_request("POST", "/api/workspaces", json!({"name": "  "})))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 400);
}

/// A failing target is refused by default and kept when asked.
#[tokio::test]
async fn test_target_add_failure_modes() {
    let app = create_router(state().await);
    let broken = json!({
        "name": "broken",
        "transport": {"type": "stdio", "command": "/nonexistent/switchboard-test-binary"}
    });

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/workspaces/dev/targets",
            broken.clone(),
        ))
        .await
        .expect("Failed to send");
    assert!(response.status().is_client_error() || response.status().is_server_error());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/workspaces/dev/targets?throwOnError=false",
            broken,
        ))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 201);
    let target = body_json(response).await;
    assert_eq!(target["name"], "broken");

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", "/api/workspaces/dev/targets/broken"))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 200);

    let response = app
        .oneshot(empty_request("DELETE", "/api/workspaces/dev/targets/broken"))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_prompt_routes() {
    let app = create_router(state().await);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/workspaces/dev/prompts",
            serde_json::to_value(greet()).expect("Failed to serialize"),
        ))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 409);

    let mut renamed = greet();
    renamed.name = "welcome".to_string();
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/workspaces/dev/prompts/greet",
            serde_json::to_value(&renamed).expect("Failed to serialize"),
        ))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 200);

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", "/api/workspaces/dev/prompts/welcome"))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 200);
    assert_eq!(body_json(response).await["name"], "welcome");

    let response = app
        .oneshot(empty_request("DELETE", "/api/workspaces/dev/prompts/welcome"))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_client_links() {
    let app = create_router(state().await);

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/clients/cursor",
            json!({"workspaceId": "dev"}),
        ))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 200);

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/clients/cursor",
            json!({"workspaceId": "missing"}),
        ))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 404);

    let response = app
        .oneshot(empty_request("DELETE", "/api/clients/cursor"))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_workspace_tools_listing() {
    let app = create_router(state().await);
    let response = app
        .oneshot(empty_request("GET", "/api/workspaces/dev/tools"))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 200);
    let body = body_json(response).await;
    let names: Vec<&str> = body["tools"]
        .as_array()
        .expect("Expected tools")
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(
        names,
        vec!["switchboard__list_targets", "switchboard__reconnect_target"]
    );
}

// =============================================================================
// API key
// =============================================================================

/// With a key configured, `/api` needs it; the MCP routes do not.
#[tokio::test]
async fn test_api_key_guards_admin_routes() {
    let app = create_router(state().await.with_api_key("secret"));

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/workspaces"))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 401);

    let mut request = empty_request("GET", "/api/workspaces");
    request
        .headers_mut()
        .insert("x-api-key", "secret".parse().expect("Failed to build header"));
    let response = app.clone().oneshot(request).await.expect("Failed to send");
    assert_eq!(response.status(), 200);

    let mut request = empty_request("GET", "/api/workspaces");
    request.headers_mut().insert(
        "authorization",
        "Bearer secret".parse().expect("Failed to build header"),
    );
    let response = app.clone().oneshot(request).await.expect("Failed to send");
    assert_eq!(response.status(), 200);

    let mut request = empty_request("GET", "/api/workspaces");
    request
        .headers_mut()
        .insert("x-api-key", "wrong".parse().expect("Failed to build header"));
    let response = app.clone().oneshot(request).await.expect("Failed to send");
    assert_eq!(response.status(), 401);

    let response = app
        .oneshot(empty_request("GET", "/health"))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 200);
}

// =============================================================================
// OAuth callback
// =============================================================================

#[tokio::test]
async fn test_callback_rejects_bad_requests() {
    let app = create_router(state().await);

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/oauth/callback?state=abc"))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 400);

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/oauth/callback?code=x&state=unknown"))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 400);

    let response = app
        .oneshot(empty_request(
            "GET",
            "/oauth/callback?error=access_denied&error_description=nope",
        ))
        .await
        .expect("Failed to send");
    assert_eq!(response.status(), 200);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    let page = String::from_utf8_lossy(&bytes);
    assert!(page.contains("access_denied: nope"));
}
