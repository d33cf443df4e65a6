use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl JsonResponse {
    fn error_with(status: StatusCode, msg: &str, code: Option<&str>) -> Response {
        (
            status,
            Json(JsonResponse {
                success: false,
                message: None,
                error: Some(msg.to_string()),
                code: code.map(str::to_string),
            }),
        )
            .into_response()
    }

    pub fn success(msg: &str) -> Response {
        (
            StatusCode::OK,
            Json(JsonResponse {
                success: true,
                message: Some(msg.to_string()),
                error: None,
                code: None,
            }),
        )
            .into_response()
    }

    pub fn bad_request(msg: &str) -> Response {
        Self::error_with(StatusCode::BAD_REQUEST, msg, None)
    }

    pub fn unauthorized(msg: &str) -> Response {
        Self::error_with(StatusCode::UNAUTHORIZED, msg, None)
    }

    pub fn payment_required(msg: &str) -> Response {
        Self::error_with(StatusCode::PAYMENT_REQUIRED, msg, Some("PRO_PLAN_REQUIRED"))
    }

    pub fn forbidden(msg: &str) -> Response {
        Self::error_with(StatusCode::FORBIDDEN, msg, None)
    }

    pub fn not_found(msg: &str) -> Response {
        Self::error_with(StatusCode::NOT_FOUND, msg, None)
    }

    pub fn too_many_requests(msg: &str) -> Response {
        Self::error_with(StatusCode::TOO_MANY_REQUESTS, msg, None)
    }

    pub fn server_error(msg: &str) -> Response {
        Self::error_with(StatusCode::INTERNAL_SERVER_ERROR, msg, None)
    }

    /// Sends the browser to the frontend error page, which offers a retry link.
    pub fn redirect_to_billing_error(frontend_origin: &str, reason: &str, retry: &str) -> Response {
        let redirect_url = format!(
            "{}/billing/error?reason={}&retry={}",
            frontend_origin.trim_end_matches('/'),
            urlencoding::encode(reason),
            urlencoding::encode(retry)
        );
        Redirect::to(&redirect_url).into_response()
    }
}
