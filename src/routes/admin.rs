use axum::{
    extract::{Json, Path, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::activity::NewActivity;
use crate::models::user::{
    normalize_email, NewUser, UserMutation, UserUpdate, LAST_SUPERADMIN_MESSAGE,
    SECOND_SUPERADMIN_MESSAGE,
};
use crate::routes::ApiJson;
use crate::routes::workspace_gate::RequireSuperadmin;
use crate::services::workspace_service;
use crate::state::AppState;
use crate::utils::password::{hash_password, password_problem};

/// Maps a rejected user write to the response the admin console shows.
fn rejected<T>(mutation: UserMutation<T>) -> Result<T, AppError> {
    match mutation {
        UserMutation::Applied(value) => Ok(value),
        UserMutation::Conflict(conflict) => Err(AppError::Conflict(conflict.message().to_string())),
        UserMutation::SecondSuperadmin => Err(AppError::validation(SECOND_SUPERADMIN_MESSAGE)),
        UserMutation::LastSuperadmin => Err(AppError::validation(LAST_SUPERADMIN_MESSAGE)),
        UserMutation::NotFound => Err(AppError::not_found("User not found")),
    }
}

async fn audit(app_state: &AppState, actor: Uuid, action: &str, data: serde_json::Value) {
    let activity = NewActivity::new(actor, action).with_data(data);
    if let Err(err) = app_state.activity_repo.record(&activity).await {
        warn!(?err, action, "failed to record admin activity");
    }
}

pub async fn platform_stats(
    State(app_state): State<AppState>,
    _admin: RequireSuperadmin,
) -> Result<Response, AppError> {
    let users = app_state.user_repo.count_users().await?;
    let workspaces = app_state.workspace_repo.count_workspaces().await?;
    let active_api_keys = app_state.api_key_repo.count_active_keys().await?;

    Ok(Json(json!({
        "success": true,
        "stats": {
            "users": users,
            "workspaces": workspaces.total,
            "pro_workspaces": workspaces.pro,
            "active_api_keys": active_api_keys,
        }
    }))
    .into_response())
}

pub async fn list_workspaces(
    State(app_state): State<AppState>,
    _admin: RequireSuperadmin,
) -> Result<Response, AppError> {
    let workspaces = app_state.workspace_repo.list_workspace_overviews().await?;
    Ok(Json(json!({ "success": true, "workspaces": workspaces })).into_response())
}

#[derive(Deserialize)]
pub struct CreateWorkspacePayload {
    pub name: String,
    #[serde(default)]
    pub owner_id: Option<Uuid>,
}

pub async fn create_workspace(
    State(app_state): State<AppState>,
    RequireSuperadmin(admin): RequireSuperadmin,
    ApiJson(payload): ApiJson<CreateWorkspacePayload>,
) -> Result<Response, AppError> {
    let owner_id = payload.owner_id.unwrap_or(admin.user.id);
    if app_state.user_repo.find_user_by_id(owner_id).await?.is_none() {
        return Err(AppError::not_found("Owner not found"));
    }

    let workspace = workspace_service::create_workspace(
        app_state.workspace_repo.as_ref(),
        &payload.name,
        owner_id,
    )
    .await?;
    audit(
        &app_state,
        admin.user.id,
        "Workspace created",
        json!({ "workspace_id": workspace.id, "owner_id": owner_id }),
    )
    .await;
    Ok(Json(json!({ "success": true, "workspace": workspace })).into_response())
}

#[derive(Deserialize)]
pub struct CreateUserPayload {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_superadmin: bool,
}

pub async fn create_user(
    State(app_state): State<AppState>,
    RequireSuperadmin(admin): RequireSuperadmin,
    ApiJson(payload): ApiJson<CreateUserPayload>,
) -> Result<Response, AppError> {
    let email = normalize_email(&payload.email);
    if !email.contains('@') {
        return Err(AppError::validation("A valid email is required"));
    }
    if let Some(problem) = password_problem(&payload.password) {
        return Err(AppError::validation(problem));
    }
    let password_hash = hash_password(&payload.password)
        .map_err(|err| AppError::Configuration(format!("password hashing failed: {err}")))?;

    let user = rejected(
        app_state
            .user_repo
            .create_user(&NewUser {
                email,
                username: payload.username.filter(|u| !u.trim().is_empty()),
                name: payload.name.filter(|n| !n.trim().is_empty()),
                password_hash,
                is_superadmin: payload.is_superadmin,
            })
            .await?,
    )?;
    info!(admin_id = %admin.user.id, user_id = %user.id, "user created by superadmin");
    audit(&app_state, admin.user.id, "User created", json!({ "user_id": user.id })).await;
    Ok(Json(json!({ "success": true, "user": user })).into_response())
}

#[derive(Deserialize)]
pub struct UpdateUserPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub is_superadmin: Option<bool>,
}

pub async fn update_user(
    State(app_state): State<AppState>,
    RequireSuperadmin(admin): RequireSuperadmin,
    Path(user_id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateUserPayload>,
) -> Result<Response, AppError> {
    let update = UserUpdate {
        name: payload.name,
        active: payload.active,
        is_superadmin: payload.is_superadmin,
    };
    let user = rejected(app_state.user_repo.update_user(user_id, &update).await?)?;

    if update.active == Some(false) {
        let closed = app_state
            .session_repo
            .deactivate_other_sessions(user_id, None)
            .await?;
        info!(%user_id, closed, "sessions closed for deactivated user");
    }
    audit(
        &app_state,
        admin.user.id,
        "User updated",
        json!({ "user_id": user_id, "active": update.active, "is_superadmin": update.is_superadmin }),
    )
    .await;
    Ok(Json(json!({ "success": true, "user": user })).into_response())
}

pub async fn delete_user(
    State(app_state): State<AppState>,
    RequireSuperadmin(admin): RequireSuperadmin,
    Path(user_id): Path<Uuid>,
) -> Result<Response, AppError> {
    rejected(app_state.user_repo.delete_user(user_id).await?)?;
    info!(admin_id = %admin.user.id, %user_id, "user deleted");
    audit(&app_state, admin.user.id, "User deleted", json!({ "user_id": user_id })).await;
    Ok(Json(json!({ "success": true })).into_response())
}
