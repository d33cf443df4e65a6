use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::responses::JsonResponse;
use crate::routes::auth::session::CurrentCaller;
use crate::routes::workspace_gate::{RequireAdmin, WorkspaceAccess};
use crate::services::billing::BillingError;
use crate::state::AppState;

fn settings_url(frontend_origin: &str, workspace_id: uuid::Uuid) -> String {
    format!(
        "{}/workspace/{workspace_id}/settings",
        frontend_origin.trim_end_matches('/')
    )
}

fn billing_failure(app_state: &AppState, err: &BillingError, retry: &str) -> Response {
    let reason = match err {
        BillingError::Config(_) => "Billing is not configured",
        BillingError::Timeout => "The billing provider did not respond in time",
        _ => "The billing provider request failed",
    };
    JsonResponse::redirect_to_billing_error(&app_state.config.frontend_origin, reason, retry)
}

/// Sends a workspace admin to the provider-hosted checkout.
pub async fn upgrade_redirect(
    State(app_state): State<AppState>,
    WorkspaceAccess(ctx, _): WorkspaceAccess<RequireAdmin>,
) -> Response {
    let workspace = &ctx.workspace;
    if workspace.is_pro() {
        return match workspace.billing_customer_id {
            Some(_) => Redirect::to(&format!("/workspace/billing?workspace_id={}", workspace.id))
                .into_response(),
            None => Redirect::to(&settings_url(&app_state.config.frontend_origin, workspace.id))
                .into_response(),
        };
    }

    let retry = format!("/workspace/upgrade?workspace_id={}", workspace.id);
    match app_state
        .billing
        .create_upgrade_session(
            workspace.id,
            &ctx.caller.user.email,
            &app_state.config.public_base_url,
        )
        .await
    {
        Ok(session) => {
            info!(workspace_id = %workspace.id, session_id = %session.id, "redirecting to checkout");
            Redirect::to(&session.url).into_response()
        }
        Err(err) => {
            error!(?err, workspace_id = %workspace.id, "failed to create checkout session");
            billing_failure(&app_state, &err, &retry)
        }
    }
}

/// Sends a workspace admin to the provider-hosted billing portal.
pub async fn billing_portal_redirect(
    State(app_state): State<AppState>,
    WorkspaceAccess(ctx, _): WorkspaceAccess<RequireAdmin>,
) -> Response {
    let workspace = &ctx.workspace;
    let Some(customer_id) = workspace.billing_customer_id.as_deref() else {
        return Redirect::to(&format!("/workspace/upgrade?workspace_id={}", workspace.id))
            .into_response();
    };

    let retry = format!("/workspace/billing?workspace_id={}", workspace.id);
    match app_state
        .billing
        .create_portal_session(customer_id, workspace.id, &app_state.config.public_base_url)
        .await
    {
        Ok(session) => Redirect::to(&session.url).into_response(),
        Err(err) => {
            error!(?err, workspace_id = %workspace.id, "failed to create portal session");
            billing_failure(&app_state, &err, &retry)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub session_id: Option<String>,
    pub id: Option<String>,
}

/// Return leg of the hosted checkout. Stripe sends `session_id`, Chargebee `id`.
pub async fn billing_success(
    State(app_state): State<AppState>,
    _caller: CurrentCaller,
    Query(query): Query<SuccessQuery>,
) -> Response {
    let frontend = app_state.config.frontend_origin.as_str();
    let Some(checkout_id) = query
        .session_id
        .or(query.id)
        .filter(|id| !id.trim().is_empty())
    else {
        return JsonResponse::redirect_to_billing_error(
            frontend,
            "Missing checkout reference",
            "/dashboard",
        );
    };

    let retry = format!("/billing/success?session_id={}", urlencoding::encode(&checkout_id));
    match app_state.billing.handle_successful_payment(&checkout_id).await {
        Ok(Some(workspace_id)) => Redirect::to(&format!(
            "{}?upgraded=1",
            settings_url(frontend, workspace_id)
        ))
        .into_response(),
        Ok(None) => {
            warn!(%checkout_id, "checkout could not be reconciled yet");
            JsonResponse::redirect_to_billing_error(
                frontend,
                "Your payment has not been confirmed yet",
                &retry,
            )
        }
        Err(err) => {
            error!(?err, %checkout_id, "failed to reconcile checkout");
            billing_failure(&app_state, &err, &retry)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::http::StatusCode;
    use tower::ServiceExt;

    use crate::db::mock_db::MockDb;
    use crate::models::workspace::{MembershipRole, WorkspacePlan};
    use crate::routes::app_router;
    use crate::services::billing::mock::MockBillingProvider;
    use crate::services::billing::{BillingService, CheckoutState};
    use crate::state::test_support::{get, location, login_cookie, test_state};

    #[tokio::test]
    async fn upgrade_redirects_admin_to_checkout_with_public_base_url() {
        let db = Arc::new(MockDb::default());
        let provider = Arc::new(MockBillingProvider::default());
        let state = test_state(db.clone(), provider.clone());
        let owner = db.insert_user("owner@example.com", false);
        let ws = db.insert_workspace("Acme", owner.id);
        let cookie = login_cookie(&state, &owner).await;

        let resp = app_router(state)
            .oneshot(get(
                &format!("/workspace/upgrade?workspace_id={}", ws.id),
                Some(&cookie),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), format!("https://checkout.example.test/{}", ws.id));
        let requests = provider.upgrade_requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].user_email, "owner@example.com");
        assert_eq!(requests[0].base_url, "https://api.example.com/");
    }

    #[tokio::test]
    async fn members_cannot_start_an_upgrade() {
        let db = Arc::new(MockDb::default());
        let provider = Arc::new(MockBillingProvider::default());
        let state = test_state(db.clone(), provider.clone());
        let owner = db.insert_user("owner@example.com", false);
        let member = db.insert_user("member@example.com", false);
        let ws = db.insert_workspace("Acme", owner.id);
        db.insert_membership(ws.id, member.id, MembershipRole::Member);
        let cookie = login_cookie(&state, &member).await;

        let resp = app_router(state)
            .oneshot(get(
                &format!("/workspace/upgrade?workspace_id={}", ws.id),
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(provider.upgrade_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pro_workspace_upgrade_goes_to_portal_or_settings() {
        let db = Arc::new(MockDb::default());
        let state = test_state(db.clone(), Arc::new(MockBillingProvider::default()));
        let owner = db.insert_user("owner@example.com", false);
        let ws = db.insert_workspace("Acme", owner.id);
        let cookie = login_cookie(&state, &owner).await;
        let uri = format!("/workspace/upgrade?workspace_id={}", ws.id);

        db.set_plan(ws.id, WorkspacePlan::Pro, Some("cus_1"));
        let resp = app_router(state.clone())
            .oneshot(get(&uri, Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(
            location(&resp),
            format!("/workspace/billing?workspace_id={}", ws.id)
        );

        db.set_plan(ws.id, WorkspacePlan::Pro, None);
        let resp = app_router(state.clone())
            .oneshot(get(&uri, Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(
            location(&resp),
            format!("https://app.example.com/workspace/{}/settings", ws.id)
        );
    }

    #[tokio::test]
    async fn billing_portal_requires_customer() {
        let db = Arc::new(MockDb::default());
        let provider = Arc::new(MockBillingProvider::default());
        let state = test_state(db.clone(), provider.clone());
        let owner = db.insert_user("owner@example.com", false);
        let ws = db.insert_workspace("Acme", owner.id);
        let cookie = login_cookie(&state, &owner).await;
        let uri = format!("/workspace/billing?workspace_id={}", ws.id);

        let resp = app_router(state.clone())
            .oneshot(get(&uri, Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(
            location(&resp),
            format!("/workspace/upgrade?workspace_id={}", ws.id)
        );

        db.set_plan(ws.id, WorkspacePlan::Pro, Some("cus_9"));
        let resp = app_router(state.clone())
            .oneshot(get(&uri, Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(location(&resp), "https://portal.example.test/cus_9");
        assert_eq!(
            provider.portal_requests.lock().unwrap()[0],
            ("cus_9".to_string(), ws.id)
        );
    }

    #[tokio::test]
    async fn provider_failure_redirects_to_error_page_with_retry() {
        let db = Arc::new(MockDb::default());
        let provider = Arc::new(MockBillingProvider {
            unconfigured: true,
            ..Default::default()
        });
        let state = test_state(db.clone(), provider);
        let owner = db.insert_user("owner@example.com", false);
        let ws = db.insert_workspace("Acme", owner.id);
        let cookie = login_cookie(&state, &owner).await;

        let resp = app_router(state)
            .oneshot(get(
                &format!("/workspace/upgrade?workspace_id={}", ws.id),
                Some(&cookie),
            ))
            .await
            .unwrap();
        let loc = location(&resp);
        assert!(loc.starts_with("https://app.example.com/billing/error?reason="));
        assert!(loc.contains("retry=%2Fworkspace%2Fupgrade"));
    }

    #[tokio::test]
    async fn success_page_upgrades_and_redirects_to_settings() {
        let db = Arc::new(MockDb::default());
        let provider = Arc::new(MockBillingProvider::default());
        let state = test_state(db.clone(), provider.clone());
        let owner = db.insert_user("owner@example.com", false);
        let ws = db.insert_workspace("Acme", owner.id);
        let cookie = login_cookie(&state, &owner).await;
        provider.set_checkout(
            "cs_1",
            CheckoutState::Succeeded {
                workspace_id: Some(ws.id.to_string()),
                customer_id: Some("cus_123".into()),
            },
        );

        let resp = app_router(state.clone())
            .oneshot(get("/billing/success?session_id=cs_1", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(
            location(&resp),
            format!("https://app.example.com/workspace/{}/settings?upgraded=1", ws.id)
        );
        let stored = db.workspace(ws.id);
        assert_eq!(stored.plan, WorkspacePlan::Pro);
        assert_eq!(stored.billing_customer_id.as_deref(), Some("cus_123"));

        let resp = app_router(state.clone())
            .oneshot(get(
                &format!("/api/workspace/{}/activities", ws.id),
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn pending_checkout_shows_retryable_error() {
        let db = Arc::new(MockDb::default());
        let provider = Arc::new(MockBillingProvider::default());
        let state = test_state(db.clone(), provider.clone());
        let owner = db.insert_user("owner@example.com", false);
        let cookie = login_cookie(&state, &owner).await;
        provider.set_checkout(
            "hp_1",
            CheckoutState::Pending {
                status: "in_progress".into(),
            },
        );

        let resp = app_router(state)
            .oneshot(get("/billing/success?id=hp_1", Some(&cookie)))
            .await
            .unwrap();
        let loc = location(&resp);
        assert!(loc.starts_with("https://app.example.com/billing/error"));
        assert!(loc.contains("hp_1"));
    }

    #[tokio::test]
    async fn slow_provider_on_success_page_is_bounded() {
        let db = Arc::new(MockDb::default());
        let provider = Arc::new(MockBillingProvider {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let mut state = test_state(db.clone(), provider.clone());
        state.billing = Arc::new(BillingService::new(
            provider,
            db.clone(),
            Duration::from_millis(20),
        ));
        let owner = db.insert_user("owner@example.com", false);
        let cookie = login_cookie(&state, &owner).await;

        let resp = app_router(state)
            .oneshot(get("/billing/success?session_id=cs_slow", Some(&cookie)))
            .await
            .unwrap();
        let loc = location(&resp);
        assert!(loc.contains("did%20not%20respond"));
    }
}
