use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use axum_extra::extract::cookie::CookieJar;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::api_key::{hash_api_key, looks_like_api_key};
use crate::models::user::User;
use crate::state::AppState;

pub const AUTH_COOKIE: &str = "auth_token";

#[derive(Debug, Clone, PartialEq)]
pub enum AuthMethod {
    Session {
        token: String,
        current_workspace_id: Option<Uuid>,
    },
    /// Bearer API key; bound to the workspace it was issued for.
    ApiKey { key_id: Uuid, workspace_id: Uuid },
}

/// Authenticated caller, from either an API key or the session cookie.
#[derive(Debug, Clone)]
pub struct CurrentCaller {
    pub user: User,
    pub method: AuthMethod,
}

impl CurrentCaller {
    pub fn is_superadmin(&self) -> bool {
        self.user.is_superadmin
    }

    pub fn session_token(&self) -> Option<&str> {
        match &self.method {
            AuthMethod::Session { token, .. } => Some(token),
            AuthMethod::ApiKey { .. } => None,
        }
    }

    pub fn api_key_workspace(&self) -> Option<Uuid> {
        match &self.method {
            AuthMethod::ApiKey { workspace_id, .. } => Some(*workspace_id),
            AuthMethod::Session { .. } => None,
        }
    }

    pub fn session_workspace(&self) -> Option<Uuid> {
        match &self.method {
            AuthMethod::Session {
                current_workspace_id,
                ..
            } => *current_workspace_id,
            AuthMethod::ApiKey { .. } => None,
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

async fn authenticate_api_key(state: &AppState, token: &str) -> Result<CurrentCaller, AppError> {
    if !looks_like_api_key(token) {
        return Err(AppError::Unauthorized("Invalid API key".into()));
    }
    let key = state
        .api_key_repo
        .find_active_by_hash(&hash_api_key(token))
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid API key".into()))?;

    let user = state
        .user_repo
        .find_user_by_id(key.user_id)
        .await?
        .filter(|u| u.active)
        .ok_or_else(|| AppError::Unauthorized("Invalid API key".into()))?;

    if let Err(err) = state.api_key_repo.touch_last_used(key.id).await {
        warn!(?err, key_id = %key.id, "failed to stamp api key usage");
    }

    Ok(CurrentCaller {
        user,
        method: AuthMethod::ApiKey {
            key_id: key.id,
            workspace_id: key.workspace_id,
        },
    })
}

async fn authenticate_cookie(state: &AppState, parts: &Parts) -> Result<CurrentCaller, AppError> {
    let jar = CookieJar::from_headers(&parts.headers);
    let token = jar.get(AUTH_COOKIE).ok_or_else(AppError::unauthorized)?;

    let claims = state
        .session_tokens
        .verify(token.value())
        .map_err(|_| AppError::unauthorized())?;
    let user_id = claims.sub;

    let session = state
        .session_repo
        .find_active_session(&claims.sid)
        .await?
        .filter(|s| s.user_id == user_id && s.is_live(OffsetDateTime::now_utc()))
        .ok_or_else(|| AppError::Unauthorized("Session expired".into()))?;

    let user = state
        .user_repo
        .find_user_by_id(user_id)
        .await?
        .filter(|u| u.active)
        .ok_or_else(AppError::unauthorized)?;

    if let Err(err) = state.session_repo.touch_session(&session.session_token).await {
        warn!(?err, %user_id, "failed to refresh session activity");
    }

    Ok(CurrentCaller {
        user,
        method: AuthMethod::Session {
            token: session.session_token,
            current_workspace_id: session.current_workspace_id,
        },
    })
}

impl FromRequestParts<AppState> for CurrentCaller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(cached) = parts.extensions.get::<CurrentCaller>() {
            return Ok(cached.clone());
        }

        let caller = match bearer_token(parts) {
            Some(token) => authenticate_api_key(state, token).await?,
            None => authenticate_cookie(state, parts).await?,
        };

        parts.extensions.insert(caller.clone());
        Ok(caller)
    }
}
