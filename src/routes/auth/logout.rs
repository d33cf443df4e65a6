use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use time::Duration as TimeDuration;
use tracing::error;

use super::login::auth_cookie;
use super::session::CurrentCaller;
use crate::errors::AppError;
use crate::responses::JsonResponse;
use crate::state::AppState;

pub async fn handle_logout(
    State(app_state): State<AppState>,
    caller: Result<CurrentCaller, AppError>,
) -> Response {
    if let Some(token) = caller.as_ref().ok().and_then(|c| c.session_token()) {
        if let Err(err) = app_state.auth_hooks.on_logged_out(token).await {
            error!(?err, "failed to deactivate session on logout");
            return JsonResponse::server_error("Logout failed");
        }
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        auth_cookie(
            String::new(),
            TimeDuration::seconds(0),
            app_state.config.auth_cookie_secure,
        ),
    );

    (StatusCode::OK, headers, JsonResponse::success("Logged out")).into_response()
}
