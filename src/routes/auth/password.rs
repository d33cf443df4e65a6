use axum::{
    extract::State,
    response::Response,
};
use serde::Deserialize;
use tracing::{error, info};

use super::session::CurrentCaller;
use crate::errors::AppError;
use crate::responses::JsonResponse;
use crate::routes::ApiJson;
use crate::state::AppState;
use crate::utils::ip::ClientIp;
use crate::utils::password::{hash_password, password_problem, verify_password};

#[derive(Deserialize)]
pub struct ChangePasswordPayload {
    pub current_password: String,
    pub new_password: String,
}

pub async fn handle_change_password(
    State(app_state): State<AppState>,
    caller: CurrentCaller,
    ip: ClientIp,
    ApiJson(payload): ApiJson<ChangePasswordPayload>,
) -> Result<Response, AppError> {
    let user = &caller.user;
    if !verify_password(&payload.current_password, &user.password_hash).unwrap_or(false) {
        return Err(AppError::validation("Current password is incorrect"));
    }
    if let Some(problem) = password_problem(&payload.new_password) {
        return Err(AppError::validation(problem));
    }

    let hash = hash_password(&payload.new_password).map_err(|err| {
        error!(?err, user_id = %user.id, "password hashing failed");
        AppError::Configuration("password hashing failed".into())
    })?;
    app_state.user_repo.update_password(user.id, &hash).await?;
    app_state
        .auth_hooks
        .on_password_changed(user.id, ip.as_string())
        .await?;

    info!(user_id = %user.id, "password changed");
    Ok(JsonResponse::success("Password updated"))
}
