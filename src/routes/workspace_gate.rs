use std::collections::HashMap;
use std::marker::PhantomData;

use axum::{
    extract::{FromRequestParts, OriginalUri, Path, Query},
    http::{header, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::scope::WorkspaceScope;
use crate::errors::AppError;
use crate::models::workspace::{Workspace, WorkspaceRole};
use crate::routes::auth::session::CurrentCaller;
use crate::services::access::resolve_role;
use crate::state::AppState;

pub trait RoleRequirement: Send + Sync {
    const MIN_ROLE: WorkspaceRole;
}

pub struct RequireMember;
pub struct RequireAdmin;

impl RoleRequirement for RequireMember {
    const MIN_ROLE: WorkspaceRole = WorkspaceRole::Member;
}

impl RoleRequirement for RequireAdmin {
    const MIN_ROLE: WorkspaceRole = WorkspaceRole::Admin;
}

/// Outcome of a successful gate check for one request.
#[derive(Debug, Clone)]
pub struct WorkspaceContext {
    pub caller: CurrentCaller,
    pub workspace: Workspace,
    /// `None` only when a superadmin passed without a role of their own.
    pub role: Option<WorkspaceRole>,
    pub superadmin_override: bool,
    pub scope: WorkspaceScope,
}

impl WorkspaceContext {
    pub fn user_id(&self) -> Uuid {
        self.caller.user.id
    }
}

/// Extractor that admits the caller only when they hold at least `R::MIN_ROLE`
/// in the target workspace (or are a superadmin).
pub struct WorkspaceAccess<R: RoleRequirement>(pub WorkspaceContext, pub PhantomData<R>);

impl<R: RoleRequirement> WorkspaceAccess<R> {
    pub fn into_inner(self) -> WorkspaceContext {
        self.0
    }
}

fn parse_workspace_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::not_found("Workspace not found"))
}

async fn explicit_target(
    parts: &mut Parts,
    state: &AppState,
) -> Result<Option<Uuid>, AppError> {
    if let Ok(Path(params)) = Path::<HashMap<String, String>>::from_request_parts(parts, state).await
    {
        if let Some(raw) = params.get("workspace_id") {
            return parse_workspace_id(raw).map(Some);
        }
    }
    if let Ok(Query(params)) =
        Query::<HashMap<String, String>>::from_request_parts(parts, state).await
    {
        if let Some(raw) = params.get("workspace_id").filter(|v| !v.trim().is_empty()) {
            return parse_workspace_id(raw).map(Some);
        }
    }
    Ok(None)
}

/// Target resolution: explicit path or query id, then the API key's workspace,
/// then the session's current workspace.
async fn resolve_target(
    parts: &mut Parts,
    state: &AppState,
    caller: &CurrentCaller,
) -> Result<Uuid, AppError> {
    let explicit = explicit_target(parts, state).await?;

    if let Some(bound) = caller.api_key_workspace() {
        return match explicit {
            Some(id) if id != bound => Err(AppError::forbidden(
                "API key is not valid for this workspace",
            )),
            _ => Ok(bound),
        };
    }

    explicit
        .or_else(|| caller.session_workspace())
        .ok_or_else(|| AppError::not_found("No workspace selected"))
}

pub(crate) async fn authorize(
    parts: &mut Parts,
    state: &AppState,
    min_role: WorkspaceRole,
) -> Result<WorkspaceContext, AppError> {
    let caller = CurrentCaller::from_request_parts(parts, state).await?;
    let workspace_id = resolve_target(parts, state, &caller).await?;

    let workspace = state
        .workspace_repo
        .find_workspace(workspace_id)
        .await?
        .ok_or_else(|| AppError::not_found("Workspace not found"))?;

    let mut role = resolve_role(state.workspace_repo.as_ref(), caller.user.id, &workspace).await?;
    if caller.api_key_workspace().is_some() {
        // keys never carry more than member rights
        role = role.map(|_| WorkspaceRole::Member);
    }

    let superadmin_override = caller.is_superadmin()
        && caller.api_key_workspace().is_none()
        && !role.map(|r| r.satisfies(min_role)).unwrap_or(false);

    if !superadmin_override {
        match role {
            None => {
                warn!(user_id = %caller.user.id, %workspace_id, "workspace access denied: no membership");
                return Err(AppError::forbidden("You do not have access to this workspace"));
            }
            Some(r) if !r.satisfies(min_role) => {
                warn!(user_id = %caller.user.id, %workspace_id, role = ?r, required = ?min_role, "workspace access denied: insufficient role");
                return Err(AppError::forbidden(
                    "You do not have permission to perform this action",
                ));
            }
            Some(_) => {}
        }
    } else {
        info!(user_id = %caller.user.id, %workspace_id, "superadmin override on workspace gate");
    }

    Ok(WorkspaceContext {
        caller,
        scope: WorkspaceScope::authorized(workspace.id),
        workspace,
        role,
        superadmin_override,
    })
}

impl<R: RoleRequirement> FromRequestParts<AppState> for WorkspaceAccess<R> {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let ctx = authorize(parts, state, R::MIN_ROLE).await?;
        Ok(WorkspaceAccess(ctx, PhantomData))
    }
}

/// Path as the client sent it. Nested routers only see the stripped suffix.
fn request_path(parts: &Parts) -> &str {
    parts
        .extensions
        .get::<OriginalUri>()
        .map(|uri| uri.0.path())
        .unwrap_or_else(|| parts.uri.path())
}

/// Machine clients get JSON errors; browsers get redirects.
pub(crate) fn is_api_request(parts: &Parts) -> bool {
    let wants_json = |name: header::HeaderName| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("application/json"))
            .unwrap_or(false)
    };
    request_path(parts).starts_with("/api/")
        || wants_json(header::CONTENT_TYPE)
        || wants_json(header::ACCEPT)
}

pub enum PlanRejection {
    Access(AppError),
    ApiUpgradeRequired,
    UpgradeRedirect(Uuid),
}

impl IntoResponse for PlanRejection {
    fn into_response(self) -> Response {
        match self {
            PlanRejection::Access(err) => err.into_response(),
            PlanRejection::ApiUpgradeRequired => AppError::PaymentRequired.into_response(),
            PlanRejection::UpgradeRedirect(workspace_id) => Redirect::to(&format!(
                "/workspace/upgrade?workspace_id={workspace_id}"
            ))
            .into_response(),
        }
    }
}

/// Workspace gate plus a pro-plan requirement.
pub struct ProWorkspace<R: RoleRequirement>(pub WorkspaceContext, pub PhantomData<R>);

impl<R: RoleRequirement> ProWorkspace<R> {
    pub fn into_inner(self) -> WorkspaceContext {
        self.0
    }
}

impl<R: RoleRequirement> FromRequestParts<AppState> for ProWorkspace<R> {
    type Rejection = PlanRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let ctx = authorize(parts, state, R::MIN_ROLE)
            .await
            .map_err(PlanRejection::Access)?;
        if ctx.workspace.is_pro() {
            return Ok(ProWorkspace(ctx, PhantomData));
        }
        info!(workspace_id = %ctx.workspace.id, path = %request_path(parts), "pro plan required");
        if is_api_request(parts) {
            Err(PlanRejection::ApiUpgradeRequired)
        } else {
            Err(PlanRejection::UpgradeRedirect(ctx.workspace.id))
        }
    }
}

/// Platform-level gate for `/api/admin`.
pub struct RequireSuperadmin(pub CurrentCaller);

impl FromRequestParts<AppState> for RequireSuperadmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let caller = CurrentCaller::from_request_parts(parts, state).await?;
        if !caller.is_superadmin() || caller.api_key_workspace().is_some() {
            warn!(user_id = %caller.user.id, "superadmin route denied");
            return Err(AppError::forbidden("Superadmin access required"));
        }
        Ok(RequireSuperadmin(caller))
    }
}
