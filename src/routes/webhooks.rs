use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};

use crate::services::billing::{WebhookError, WebhookOutcome};
use crate::state::AppState;

fn ack() -> Response {
    (StatusCode::OK, "OK").into_response()
}

/// Single webhook endpoint for the configured provider: verify, record in the
/// ledger, then dispatch. Once the event is recorded the response is always
/// 200 so the provider stops redelivering.
pub async fn billing_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let provider = app_state.billing.provider_kind();

    let event = match app_state.billing.verify_webhook(&headers, &body) {
        Ok(event) => event,
        Err(WebhookError::NotConfigured) => {
            error!(provider = provider.as_str(), "webhook secret is not configured");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Webhook not configured").into_response();
        }
        Err(WebhookError::Unauthorized) => {
            warn!(provider = provider.as_str(), "webhook authentication failed");
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
        Err(WebhookError::Invalid(reason)) => {
            warn!(provider = provider.as_str(), %reason, "rejected webhook payload");
            return (StatusCode::BAD_REQUEST, "Invalid payload").into_response();
        }
    };

    match app_state
        .billing_event_repo
        .record_event(&event.id, Some(&event.event_type), provider.as_str())
        .await
    {
        Ok(Some(recorded)) => {
            info!(event_id = %recorded.event_id, provider = %recorded.provider, "billing event recorded");
        }
        Ok(None) => {
            info!(event_id = %event.id, event_type = %event.event_type, "duplicate webhook ignored");
            return ack();
        }
        Err(err) => {
            error!(?err, event_id = %event.id, "failed to record billing event");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to record event").into_response();
        }
    }

    match app_state.billing.apply_webhook_event(&event).await {
        Ok(WebhookOutcome::Ignored) => {
            info!(event_id = %event.id, event_type = %event.event_type, "webhook event not handled");
        }
        Ok(outcome) => {
            info!(event_id = %event.id, event_type = %event.event_type, ?outcome, "webhook event applied");
        }
        Err(err) => {
            error!(?err, event_id = %event.id, event_type = %event.event_type, "webhook dispatch failed");
        }
    }
    ack()
}
