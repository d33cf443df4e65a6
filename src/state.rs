use std::sync::Arc;

use crate::config::Config;
use crate::db::{
    activity_repository::ActivityRepository, api_key_repository::ApiKeyRepository,
    billing_event_repository::BillingEventRepository, session_repository::SessionRepository,
    user_repository::UserRepository, workspace_repository::WorkspaceRepository,
};
use crate::services::auth_hooks::AuthHooks;
use crate::services::billing::BillingService;
use crate::utils::jwt::SessionTokens;

#[derive(Clone)]
pub struct AppState {
    pub user_repo: Arc<dyn UserRepository>,
    pub workspace_repo: Arc<dyn WorkspaceRepository>,
    pub api_key_repo: Arc<dyn ApiKeyRepository>,
    pub billing_event_repo: Arc<dyn BillingEventRepository>,
    pub session_repo: Arc<dyn SessionRepository>,
    pub activity_repo: Arc<dyn ActivityRepository>,
    pub billing: Arc<BillingService>,
    pub auth_hooks: Arc<dyn AuthHooks>,
    pub config: Arc<Config>,
    pub session_tokens: Arc<SessionTokens>,
}
