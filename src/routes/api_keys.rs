use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::api_key::{generate_api_key, ApiKeyCreated, CreateApiKey};
use crate::routes::ApiJson;
use crate::routes::workspace_gate::{RequireAdmin, RequireMember, WorkspaceAccess};
use crate::routes::workspaces::record_activity;
use crate::state::AppState;

const MAX_KEY_NAME_LEN: usize = 100;

pub async fn list_api_keys(
    State(app_state): State<AppState>,
    WorkspaceAccess(ctx, _): WorkspaceAccess<RequireMember>,
) -> Result<Response, AppError> {
    let keys = app_state.api_key_repo.list_keys(&ctx.scope).await?;
    Ok(Json(json!({ "success": true, "keys": keys })).into_response())
}

pub async fn create_api_key(
    State(app_state): State<AppState>,
    WorkspaceAccess(ctx, _): WorkspaceAccess<RequireAdmin>,
    ApiJson(payload): ApiJson<CreateApiKey>,
) -> Result<Response, AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Key name is required"));
    }
    if name.chars().count() > MAX_KEY_NAME_LEN {
        return Err(AppError::validation("Key name is too long"));
    }

    let generated = generate_api_key();
    let key = app_state
        .api_key_repo
        .create_key(
            &ctx.scope,
            ctx.user_id(),
            name,
            &generated.prefix,
            &generated.hash,
        )
        .await?;
    info!(workspace_id = %ctx.workspace.id, key_id = %key.id, prefix = %key.prefix, "api key created");
    record_activity(
        &app_state,
        &ctx,
        "API key created",
        json!({ "key_id": key.id, "name": key.name, "prefix": key.prefix }),
    )
    .await;

    let created = ApiKeyCreated {
        id: key.id,
        name: key.name,
        key: generated.full_key,
        prefix: key.prefix,
        created_at: key.created_at,
    };
    Ok(Json(json!({ "success": true, "api_key": created })).into_response())
}

pub async fn revoke_api_key(
    State(app_state): State<AppState>,
    WorkspaceAccess(ctx, _): WorkspaceAccess<RequireAdmin>,
    Path((_, key_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, AppError> {
    if !app_state.api_key_repo.revoke_key(&ctx.scope, key_id).await? {
        return Err(AppError::not_found("API key not found"));
    }
    info!(workspace_id = %ctx.workspace.id, %key_id, "api key revoked");
    record_activity(&app_state, &ctx, "API key revoked", json!({ "key_id": key_id })).await;
    Ok(Json(json!({ "success": true })).into_response())
}
