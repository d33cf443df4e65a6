use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::activity::NewActivity;
use crate::models::user::{normalize_email, NewUser, UserMutation};
use crate::models::workspace::MembershipRole;
use crate::routes::ApiJson;
use crate::routes::auth::session::CurrentCaller;
use crate::routes::workspace_gate::{
    ProWorkspace, RequireAdmin, RequireMember, WorkspaceAccess, WorkspaceContext,
};
use crate::state::AppState;
use crate::utils::password::{hash_password, password_problem};

pub const DEFAULT_PAGE_SIZE: i64 = 25;
pub const MAX_PAGE_SIZE: i64 = 100;
const ACTIVITY_PAGE_SIZE: i64 = 100;

/// Appends an audit row for a workspace mutation. Audit failures are logged
/// and do not fail the request.
pub(crate) async fn record_activity(
    app_state: &AppState,
    ctx: &WorkspaceContext,
    action: &str,
    data: Value,
) {
    let activity = NewActivity::new(ctx.user_id(), action)
        .in_workspace(ctx.workspace.id)
        .with_data(data);
    if let Err(err) = app_state.activity_repo.record(&activity).await {
        warn!(?err, workspace_id = %ctx.workspace.id, action, "failed to record activity");
    }
}

pub async fn list_my_workspaces(
    State(app_state): State<AppState>,
    caller: CurrentCaller,
) -> Result<Response, AppError> {
    let mut memberships = app_state
        .workspace_repo
        .list_memberships_for_user(caller.user.id)
        .await?;
    if let Some(bound) = caller.api_key_workspace() {
        memberships.retain(|m| m.workspace.id == bound);
    }
    Ok(Json(json!({ "success": true, "workspaces": memberships })).into_response())
}

pub async fn switch_workspace(
    State(app_state): State<AppState>,
    WorkspaceAccess(ctx, _): WorkspaceAccess<RequireMember>,
) -> Result<Response, AppError> {
    let Some(token) = ctx.caller.session_token() else {
        return Err(AppError::validation("API keys cannot switch workspaces"));
    };
    app_state
        .session_repo
        .set_current_workspace(token, Some(ctx.workspace.id))
        .await?;
    info!(user_id = %ctx.user_id(), workspace_id = %ctx.workspace.id, "switched workspace");

    Ok(Json(json!({
        "success": true,
        "workspace": ctx.workspace,
        "role": ctx.role,
    }))
    .into_response())
}

pub async fn workspace_stats(
    State(app_state): State<AppState>,
    WorkspaceAccess(ctx, _): WorkspaceAccess<RequireMember>,
) -> Result<Response, AppError> {
    let stats = app_state.workspace_repo.workspace_stats(&ctx.scope).await?;
    Ok(Json(json!({ "success": true, "stats": stats })).into_response())
}

#[derive(Deserialize)]
pub struct UpdateWorkspacePayload {
    pub name: String,
}

pub async fn update_workspace(
    State(app_state): State<AppState>,
    WorkspaceAccess(ctx, _): WorkspaceAccess<RequireAdmin>,
    ApiJson(payload): ApiJson<UpdateWorkspacePayload>,
) -> Result<Response, AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Workspace name is required"));
    }
    let workspace = app_state
        .workspace_repo
        .update_workspace_name(&ctx.scope, name)
        .await?
        .ok_or_else(|| AppError::not_found("Workspace not found"))?;

    record_activity(
        &app_state,
        &ctx,
        "Workspace renamed",
        json!({ "from": ctx.workspace.name, "to": workspace.name }),
    )
    .await;
    Ok(Json(json!({ "success": true, "workspace": workspace })).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageOptions {
    pub page: Option<i64>,
    pub items_per_page: Option<i64>,
}

/// Accepts `{options: {page, itemsPerPage}}` as well as the same keys at the
/// top level.
#[derive(Debug, Default, Deserialize)]
pub struct MemberListRequest {
    #[serde(default)]
    pub options: Option<PageOptions>,
    #[serde(flatten)]
    pub top_level: PageOptions,
}

impl MemberListRequest {
    /// `(page, per_page)` with page >= 1 and per_page in 1..=MAX_PAGE_SIZE.
    pub fn resolve(&self) -> (i64, i64) {
        let nested = self.options.as_ref();
        let page = nested
            .and_then(|o| o.page)
            .or(self.top_level.page)
            .unwrap_or(1)
            .max(1);
        let per_page = nested
            .and_then(|o| o.items_per_page)
            .or(self.top_level.items_per_page)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, per_page)
    }
}

async fn member_page(
    app_state: &AppState,
    ctx: &WorkspaceContext,
    request: &MemberListRequest,
) -> Result<Response, AppError> {
    let (page, per_page) = request.resolve();
    let (items, total) = app_state
        .workspace_repo
        .list_members(&ctx.scope, per_page, (page - 1) * per_page)
        .await?;
    Ok(Json(json!({
        "success": true,
        "items": items,
        "total": total,
        "page": page,
        "perPage": per_page,
    }))
    .into_response())
}

pub async fn list_members(
    State(app_state): State<AppState>,
    WorkspaceAccess(ctx, _): WorkspaceAccess<RequireMember>,
    Query(options): Query<PageOptions>,
) -> Result<Response, AppError> {
    let request = MemberListRequest {
        options: None,
        top_level: options,
    };
    member_page(&app_state, &ctx, &request).await
}

pub async fn search_members(
    State(app_state): State<AppState>,
    WorkspaceAccess(ctx, _): WorkspaceAccess<RequireMember>,
    ApiJson(request): ApiJson<MemberListRequest>,
) -> Result<Response, AppError> {
    member_page(&app_state, &ctx, &request).await
}

#[derive(Deserialize)]
pub struct AddMemberPayload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

pub async fn add_member(
    State(app_state): State<AppState>,
    WorkspaceAccess(ctx, _): WorkspaceAccess<RequireAdmin>,
    ApiJson(payload): ApiJson<AddMemberPayload>,
) -> Result<Response, AppError> {
    let name = payload.name.trim();
    let username = payload.username.trim();
    let email = normalize_email(&payload.email);
    if name.is_empty() || username.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(AppError::validation(
            "Name, username, email and password are required",
        ));
    }
    if !email.contains('@') {
        return Err(AppError::validation("A valid email is required"));
    }
    if let Some(problem) = password_problem(&payload.password) {
        return Err(AppError::validation(problem));
    }
    let role = match payload.role.as_deref() {
        None => MembershipRole::Member,
        Some(raw) => MembershipRole::parse(raw)
            .ok_or_else(|| AppError::validation("Role must be admin or member"))?,
    };
    let password_hash = hash_password(&payload.password)
        .map_err(|err| AppError::Configuration(format!("password hashing failed: {err}")))?;

    let new_user = NewUser {
        email,
        username: Some(username.to_string()),
        name: Some(name.to_string()),
        password_hash,
        is_superadmin: false,
    };

    match app_state
        .workspace_repo
        .add_member_with_new_user(&ctx.scope, &new_user, role)
        .await?
    {
        UserMutation::Applied(user) => {
            info!(workspace_id = %ctx.workspace.id, member_id = %user.id, ?role, "member added");
            record_activity(
                &app_state,
                &ctx,
                "Member added",
                json!({ "user_id": user.id, "email": user.email, "role": role }),
            )
            .await;
            Ok(Json(json!({ "success": true, "member": user, "role": role })).into_response())
        }
        UserMutation::Conflict(conflict) => Err(AppError::Conflict(conflict.message().to_string())),
        UserMutation::SecondSuperadmin | UserMutation::LastSuperadmin | UserMutation::NotFound => {
            Err(AppError::not_found("Workspace not found"))
        }
    }
}

#[derive(Deserialize)]
pub struct UpdateMemberRolePayload {
    pub role: String,
}

pub async fn update_member_role(
    State(app_state): State<AppState>,
    WorkspaceAccess(ctx, _): WorkspaceAccess<RequireAdmin>,
    Path((_, member_id)): Path<(Uuid, Uuid)>,
    ApiJson(payload): ApiJson<UpdateMemberRolePayload>,
) -> Result<Response, AppError> {
    let role = MembershipRole::parse(&payload.role)
        .ok_or_else(|| AppError::validation("Role must be admin or member"))?;
    if member_id == ctx.workspace.owner_id {
        return Err(AppError::validation(
            "The workspace owner's role cannot be changed",
        ));
    }
    if !app_state
        .workspace_repo
        .set_member_role(&ctx.scope, member_id, role)
        .await?
    {
        return Err(AppError::not_found("Member not found"));
    }

    record_activity(
        &app_state,
        &ctx,
        "Member role changed",
        json!({ "user_id": member_id, "role": role }),
    )
    .await;
    Ok(Json(json!({ "success": true, "role": role })).into_response())
}

pub async fn remove_member(
    State(app_state): State<AppState>,
    WorkspaceAccess(ctx, _): WorkspaceAccess<RequireAdmin>,
    Path((_, member_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, AppError> {
    if member_id == ctx.user_id() {
        return Err(AppError::validation("You cannot remove yourself"));
    }
    if member_id == ctx.workspace.owner_id {
        return Err(AppError::validation("The workspace owner cannot be removed"));
    }
    if !app_state
        .workspace_repo
        .remove_member(&ctx.scope, member_id)
        .await?
    {
        return Err(AppError::not_found("Member not found"));
    }

    record_activity(
        &app_state,
        &ctx,
        "Member removed",
        json!({ "user_id": member_id }),
    )
    .await;
    Ok(Json(json!({ "success": true })).into_response())
}

pub async fn list_activities(
    State(app_state): State<AppState>,
    ProWorkspace(ctx, _): ProWorkspace<RequireMember>,
) -> Result<Response, AppError> {
    let items = app_state
        .activity_repo
        .list_for_workspace(&ctx.scope, ACTIVITY_PAGE_SIZE)
        .await?;
    Ok(Json(json!({ "success": true, "items": items })).into_response())
}
