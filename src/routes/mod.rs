pub mod admin;
pub mod api_keys;
pub mod auth;
pub mod billing;
pub mod webhooks;
pub mod workspace_gate;
pub mod workspaces;

use axum::{
    extract::FromRequest,
    routing::{get, post, put},
    Router,
};

use crate::errors::AppError;
use crate::state::AppState;

/// JSON body extractor whose rejections render as 400 `{success, error}`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Routes mounted under `/api/auth`.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::handle_login))
        .route("/logout", post(auth::handle_logout))
        .route("/me", get(auth::handle_me))
        .route("/password", post(auth::handle_change_password))
        .route("/sessions", get(auth::list_sessions))
        .route("/sessions/logout-others", post(auth::logout_other_sessions))
}

/// Everything except the auth routes. `webhook_path` is the single endpoint
/// of the configured billing provider.
pub fn api_routes(webhook_path: &str) -> Router<AppState> {
    let workspace_routes = Router::new()
        .route("/", put(workspaces::update_workspace))
        .route("/stats", get(workspaces::workspace_stats))
        .route(
            "/members",
            get(workspaces::list_members).post(workspaces::add_member),
        )
        .route("/members/list", post(workspaces::search_members))
        .route(
            "/members/{user_id}",
            put(workspaces::update_member_role).delete(workspaces::remove_member),
        )
        .route(
            "/keys",
            get(api_keys::list_api_keys).post(api_keys::create_api_key),
        )
        .route(
            "/keys/{key_id}",
            axum::routing::delete(api_keys::revoke_api_key),
        )
        .route("/activities", get(workspaces::list_activities));

    let admin_routes = Router::new()
        .route("/stats", get(admin::platform_stats))
        .route(
            "/workspaces",
            get(admin::list_workspaces).post(admin::create_workspace),
        )
        .route("/users", post(admin::create_user))
        .route(
            "/users/{user_id}",
            put(admin::update_user).delete(admin::delete_user),
        );

    Router::new()
        .route("/api/workspaces", get(workspaces::list_my_workspaces))
        .nest("/api/workspace/{workspace_id}", workspace_routes)
        .nest("/api/admin", admin_routes)
        .route(
            "/workspace/{workspace_id}/switch",
            post(workspaces::switch_workspace).get(workspaces::switch_workspace),
        )
        .route("/workspace/upgrade", get(billing::upgrade_redirect))
        .route("/workspace/billing", get(billing::billing_portal_redirect))
        .route("/billing/success", get(billing::billing_success))
        .route(webhook_path, post(webhooks::billing_webhook))
}

/// Full application router without the network-facing layers (rate limits,
/// CORS, tracing), which `main` adds.
pub fn app_router(state: AppState) -> Router {
    let webhook_path = state.config.billing.provider.webhook_path();
    Router::new()
        .nest("/api/auth", auth_routes())
        .merge(api_routes(webhook_path))
        .with_state(state)
}
