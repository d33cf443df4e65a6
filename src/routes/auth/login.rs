use axum::{
    extract::{Json, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{error, info, warn};

use super::session::{CurrentCaller, AUTH_COOKIE};
use crate::errors::AppError;
use crate::models::user::normalize_email;
use crate::responses::JsonResponse;
use crate::routes::ApiJson;
use crate::services::auth_hooks::LoginContext;
use crate::state::AppState;
use crate::utils::ip::ClientIp;
use crate::utils::password::verify_password;

#[derive(Deserialize, Serialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

fn new_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

pub(crate) fn auth_cookie(value: String, max_age: TimeDuration, secure: bool) -> HeaderValue {
    let cookie = Cookie::build((AUTH_COOKIE, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build();
    // cookie strings only contain visible ASCII
    HeaderValue::from_str(&cookie.to_string()).unwrap_or(HeaderValue::from_static(""))
}

pub async fn handle_login(
    State(app_state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<LoginPayload>,
) -> Response {
    let email = normalize_email(&payload.email);
    let user = match app_state.user_repo.find_user_by_email(&email).await {
        Ok(Some(record)) => record,
        Ok(None) => return JsonResponse::unauthorized("Invalid credentials"),
        Err(err) => {
            error!(?err, "failed to load user for login");
            return JsonResponse::server_error("Database error");
        }
    };

    match verify_password(&payload.password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => return JsonResponse::unauthorized("Invalid credentials"),
        Err(err) => {
            warn!(?err, user_id = %user.id, "stored password hash is unusable");
            return JsonResponse::unauthorized("Invalid credentials");
        }
    }

    if !user.active {
        return JsonResponse::unauthorized("Account is disabled");
    }

    let ttl = TimeDuration::hours(app_state.config.session_ttl_hours);
    let expires_at = OffsetDateTime::now_utc() + ttl;
    let session_token = new_session_token();

    let ctx = LoginContext {
        user_id: user.id,
        session_token: session_token.clone(),
        ip: ip.map(|ip| ip.to_string()),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        expires_at: Some(expires_at),
    };
    if let Err(err) = app_state.auth_hooks.on_authenticated(&ctx).await {
        error!(?err, user_id = %user.id, "post-login hooks failed");
        return JsonResponse::server_error("Login failed");
    }

    let token = match app_state
        .session_tokens
        .issue(user.id, &session_token, expires_at)
    {
        Ok(token) => token,
        Err(err) => {
            error!(?err, "JWT creation failed");
            return JsonResponse::server_error("Token generation failed");
        }
    };

    info!(user_id = %user.id, "user logged in");
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        auth_cookie(token, ttl, app_state.config.auth_cookie_secure),
    );
    (
        StatusCode::OK,
        headers,
        Json(json!({ "success": true, "user": user })),
    )
        .into_response()
}

pub async fn handle_me(
    State(app_state): State<AppState>,
    caller: CurrentCaller,
) -> Result<Response, AppError> {
    let memberships = app_state
        .workspace_repo
        .list_memberships_for_user(caller.user.id)
        .await?;
    let current_workspace_id = caller
        .session_workspace()
        .or_else(|| caller.api_key_workspace());

    Ok(Json(json!({
        "success": true,
        "user": caller.user,
        "memberships": memberships,
        "current_workspace_id": current_workspace_id,
    }))
    .into_response())
}
