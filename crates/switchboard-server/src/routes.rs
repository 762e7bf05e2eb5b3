//! Admin REST API, mounted under `/api`.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use switchboard_core::{TargetPatch, WorkspaceInfo, WorkspacePatch};
use switchboard_storage::{PromptRecord, ServerRecord};

pub(crate) fn admin_router() -> Router<AppState> {
    Router::new()
        // ===================
        // Workspaces
        // ===================
        .route("/workspaces", get(workspace_list).post(workspace_create))
        .route(
            "/workspaces/{id}",
            get(workspace_get)
                .patch(workspace_update)
                .delete(workspace_delete),
        )
        .route("/workspaces/{id}/tools", get(workspace_tools))
        // ===================
        // Targets
        // ===================
        .route("/workspaces/{id}/targets", post(target_add))
        .route(
            "/workspaces/{id}/targets/{name}",
            patch(target_update).delete(target_delete),
        )
        .route(
            "/workspaces/{id}/targets/{name}/reconnect",
            post(target_reconnect),
        )
        .route("/workspaces/{id}/registry", post(registry_install))
        // ===================
        // Prompts
        // ===================
        .route("/workspaces/{id}/prompts", post(prompt_add))
        .route(
            "/workspaces/{id}/prompts/{name}",
            put(prompt_update).delete(prompt_delete),
        )
        // ===================
        // Installer clients
        // ===================
        .route("/clients/{client}", put(client_link).delete(client_unlink))
}

// =============================================================================
// Workspaces
// =============================================================================

async fn workspace_list(State(state): State<AppState>) -> impl IntoResponse {
    let workspaces = state.store.list().await;
    let infos: Vec<WorkspaceInfo> =
        futures::future::join_all(workspaces.iter().map(|w| w.info())).await;
    Json(infos)
}

#[derive(Debug, Deserialize)]
struct CreateWorkspaceRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

async fn workspace_create(
    State(state): State<AppState>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> ApiResult<impl IntoResponse> {
    let workspace = state
        .store
        .create(&req.name, req.description)
        .await
        .map_err(ApiError::gateway)?;
    Ok((StatusCode::CREATED, Json(workspace.info().await)))
}

async fn workspace_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkspaceInfo>> {
    let workspace = state.store.get(&id).await.map_err(ApiError::gateway)?;
    Ok(Json(workspace.info().await))
}

async fn workspace_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<WorkspacePatch>,
) -> ApiResult<Json<WorkspaceInfo>> {
    let workspace = state
        .store
        .update_workspace(&id, patch)
        .await
        .map_err(ApiError::gateway)?;
    Ok(Json(workspace.info().await))
}

async fn workspace_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.store.delete(&id).await.map_err(ApiError::gateway)?;
    state.evict_sessions(&id).await;
    Ok(Json(json!({ "success": true })))
}

/// The merged tool listing, as a session would see it.
async fn workspace_tools(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let workspace = state.store.get(&id).await.map_err(ApiError::gateway)?;
    let snapshot = workspace.list_tools().await;
    Ok(Json(json!({ "tools": snapshot.items })))
}

// =============================================================================
// Targets
// =============================================================================

#[derive(Debug, Deserialize)]
struct AddTargetQuery {
    #[serde(default, rename = "throwOnError")]
    throw_on_error: Option<bool>,
}

async fn target_add(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<AddTargetQuery>,
    Json(record): Json<ServerRecord>,
) -> ApiResult<impl IntoResponse> {
    let target = state
        .store
        .add_target(&id, record, query.throw_on_error.unwrap_or(true))
        .await
        .map_err(ApiError::gateway)?;
    Ok((StatusCode::CREATED, Json(target.info().await)))
}

async fn target_update(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Json(patch): Json<TargetPatch>,
) -> ApiResult<impl IntoResponse> {
    let target = state
        .store
        .update_target(&id, &name, patch)
        .await
        .map_err(ApiError::gateway)?;
    Ok(Json(target.info().await))
}

async fn target_delete(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    state
        .store
        .remove_target(&id, &name)
        .await
        .map_err(ApiError::gateway)?;
    Ok(Json(json!({ "success": true })))
}

async fn target_reconnect(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let workspace = state.store.get(&id).await.map_err(ApiError::gateway)?;
    let target = workspace
        .reconnect_target(&name)
        .await
        .map_err(ApiError::gateway)?;
    Ok(Json(target.info().await))
}

#[derive(Debug, Deserialize)]
struct RegistryInstallRequest {
    entry: String,
    name: String,
    #[serde(default)]
    values: HashMap<String, String>,
}

async fn registry_install(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RegistryInstallRequest>,
) -> ApiResult<impl IntoResponse> {
    let target = state
        .store
        .add_from_registry(&id, &req.entry, &req.name, &req.values)
        .await
        .map_err(ApiError::gateway)?;
    Ok((StatusCode::CREATED, Json(target.info().await)))
}

// =============================================================================
// Prompts
// =============================================================================

async fn prompt_add(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(prompt): Json<PromptRecord>,
) -> ApiResult<impl IntoResponse> {
    state
        .store
        .add_prompt(&id, prompt.clone())
        .await
        .map_err(ApiError::gateway)?;
    Ok((StatusCode::CREATED, Json(prompt)))
}

async fn prompt_update(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Json(prompt): Json<PromptRecord>,
) -> ApiResult<impl IntoResponse> {
    state
        .store
        .update_prompt(&id, &name, prompt.clone())
        .await
        .map_err(ApiError::gateway)?;
    Ok(Json(prompt))
}

async fn prompt_delete(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let removed = state
        .store
        .remove_prompt(&id, &name)
        .await
        .map_err(ApiError::gateway)?;
    Ok(Json(removed))
}

// =============================================================================
// Installer clients
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkClientRequest {
    workspace_id: String,
}

async fn client_link(
    State(state): State<AppState>,
    Path(client): Path<String>,
    Json(req): Json<LinkClientRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .store
        .link_client(&client, &req.workspace_id)
        .await
        .map_err(ApiError::gateway)?;
    Ok(Json(json!({ "client": client, "workspaceId": req.workspace_id })))
}

async fn client_unlink(
    State(state): State<AppState>,
    Path(client): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .store
        .unlink_client(&client)
        .await
        .map_err(ApiError::gateway)?;
    Ok(Json(json!({ "success": true })))
}
