use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::responses::JsonResponse;

/// Failures surfaced by API handlers. Each variant maps to one status code;
/// operator-only details are logged, never rendered.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Pro plan required")]
    PaymentRequired,
    #[error("{0}")]
    Conflict(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn unauthorized() -> Self {
        AppError::Unauthorized("Authentication required".to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Validation(msg) | AppError::Conflict(msg) => JsonResponse::bad_request(msg),
            AppError::NotFound(msg) => JsonResponse::not_found(msg),
            AppError::Unauthorized(msg) => JsonResponse::unauthorized(msg),
            AppError::Forbidden(msg) => JsonResponse::forbidden(msg),
            AppError::PaymentRequired => JsonResponse::payment_required("Pro plan required"),
            AppError::Configuration(detail) => {
                error!(%detail, "request failed on missing configuration");
                JsonResponse::server_error("Service is not configured")
            }
            AppError::Upstream(detail) => {
                error!(%detail, "billing provider request failed");
                JsonResponse::server_error("Billing provider request failed")
            }
            AppError::Database(err) => {
                error!(?err, "database error");
                JsonResponse::server_error("Database error")
            }
        }
    }
}
