use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::info;

use super::session::CurrentCaller;
use crate::errors::AppError;
use crate::state::AppState;

pub async fn list_sessions(
    State(app_state): State<AppState>,
    caller: CurrentCaller,
) -> Result<Response, AppError> {
    let current = caller.session_token();
    let sessions: Vec<_> = app_state
        .session_repo
        .list_active_sessions(caller.user.id)
        .await?
        .into_iter()
        .map(|s| {
            let is_current = Some(s.session_token.as_str()) == current;
            json!({ "session": s, "current": is_current })
        })
        .collect();

    Ok(Json(json!({ "success": true, "sessions": sessions })).into_response())
}

pub async fn logout_other_sessions(
    State(app_state): State<AppState>,
    caller: CurrentCaller,
) -> Result<Response, AppError> {
    let Some(token) = caller.session_token() else {
        return Err(AppError::forbidden("Session login required"));
    };
    let closed = app_state
        .session_repo
        .deactivate_other_sessions(caller.user.id, Some(token))
        .await?;
    info!(user_id = %caller.user.id, closed, "logged out other sessions");

    Ok(Json(json!({ "success": true, "closed": closed })).into_response())
}
