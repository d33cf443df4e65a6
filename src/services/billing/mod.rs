use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::BillingProviderKind;
use crate::db::workspace_repository::WorkspaceRepository;
use crate::errors::AppError;
use crate::models::workspace::{DowngradeRule, UpgradeOutcome};

pub mod chargebee;
#[cfg(test)]
pub mod mock;
pub mod stripe;

pub use self::chargebee::ChargebeeBillingProvider;
pub use self::stripe::StripeBillingProvider;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("billing provider not configured: {0}")]
    Config(String),
    #[error("billing provider api error: {0}")]
    Api(String),
    #[error("billing provider request timed out")]
    Timeout,
    #[error("unexpected billing provider response: {0}")]
    Serde(String),
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl From<::stripe::StripeError> for BillingError {
    fn from(err: ::stripe::StripeError) -> Self {
        BillingError::Api(err.to_string())
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BillingError::Timeout
        } else {
            BillingError::Api(err.to_string())
        }
    }
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Config(detail) => AppError::Configuration(detail),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook secret is not configured")]
    NotConfigured,
    #[error("webhook authentication failed")]
    Unauthorized,
    #[error("invalid webhook: {0}")]
    Invalid(String),
}

/// Opaque provider-hosted page the caller is redirected to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostedSession {
    pub id: String,
    pub url: String,
}

/// State of a checkout (Stripe session or Chargebee hosted page).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutState {
    Pending {
        status: String,
    },
    Succeeded {
        workspace_id: Option<String>,
        customer_id: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAction {
    CheckoutCompleted { checkout_id: String },
    SubscriptionCancelled { customer_id: Option<String> },
    PaymentFailed { customer_id: Option<String> },
    Ignored,
}

/// A verified webhook delivery in provider-neutral form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub action: WebhookAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Upgraded(Option<Uuid>),
    Downgraded(Vec<Uuid>),
    Ignored,
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookDispatchError {
    #[error(transparent)]
    Billing(#[from] BillingError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    fn kind(&self) -> BillingProviderKind;

    async fn create_upgrade_session(
        &self,
        workspace_id: Uuid,
        user_email: &str,
        base_url: &str,
    ) -> Result<HostedSession, BillingError>;

    async fn create_portal_session(
        &self,
        customer_id: &str,
        workspace_id: Uuid,
        base_url: &str,
    ) -> Result<HostedSession, BillingError>;

    async fn fetch_checkout(&self, checkout_id: &str) -> Result<CheckoutState, BillingError>;

    /// Authenticates the delivery and normalizes its payload. Must run before
    /// any state change.
    fn verify_webhook(&self, headers: &HeaderMap, body: &[u8])
        -> Result<WebhookEvent, WebhookError>;
}

/// Keeps workspace plans in sync with the single configured provider.
pub struct BillingService {
    provider: Arc<dyn BillingProvider>,
    workspace_repo: Arc<dyn WorkspaceRepository>,
    timeout: Duration,
}

impl BillingService {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        workspace_repo: Arc<dyn WorkspaceRepository>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            workspace_repo,
            timeout,
        }
    }

    pub fn provider_kind(&self) -> BillingProviderKind {
        self.provider.kind()
    }

    pub fn verify_webhook(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<WebhookEvent, WebhookError> {
        self.provider.verify_webhook(headers, body)
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, BillingError>
    where
        F: Future<Output = Result<T, BillingError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| BillingError::Timeout)?
    }

    pub async fn create_upgrade_session(
        &self,
        workspace_id: Uuid,
        user_email: &str,
        base_url: &str,
    ) -> Result<HostedSession, BillingError> {
        self.bounded(
            self.provider
                .create_upgrade_session(workspace_id, user_email, base_url),
        )
        .await
    }

    pub async fn create_portal_session(
        &self,
        customer_id: &str,
        workspace_id: Uuid,
        base_url: &str,
    ) -> Result<HostedSession, BillingError> {
        self.bounded(
            self.provider
                .create_portal_session(customer_id, workspace_id, base_url),
        )
        .await
    }

    /// Reconciles a finished checkout into a pro upgrade. `Ok(None)` means
    /// there is nothing to do yet (not paid, no metadata, unknown workspace, or
    /// a failed write that was rolled back). Provider I/O completes before any
    /// database write starts.
    pub async fn handle_successful_payment(
        &self,
        checkout_id: &str,
    ) -> Result<Option<Uuid>, BillingError> {
        let state = self.bounded(self.provider.fetch_checkout(checkout_id)).await?;

        let (workspace_ref, customer_id) = match state {
            CheckoutState::Pending { status } => {
                info!(checkout_id, %status, "checkout not in a paid state yet");
                return Ok(None);
            }
            CheckoutState::Succeeded {
                workspace_id,
                customer_id,
            } => (workspace_id, customer_id),
        };

        let Some(workspace_id) = workspace_ref
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        else {
            warn!(checkout_id, ?workspace_ref, "checkout carries no usable workspace_id");
            return Ok(None);
        };

        match self
            .workspace_repo
            .upgrade_to_pro(workspace_id, customer_id.as_deref())
            .await
        {
            Ok(UpgradeOutcome::Upgraded) => {
                info!(%workspace_id, ?customer_id, "workspace upgraded to pro");
                Ok(Some(workspace_id))
            }
            Ok(UpgradeOutcome::AlreadyPro) => {
                info!(%workspace_id, "workspace already pro; upgrade skipped");
                Ok(Some(workspace_id))
            }
            Ok(UpgradeOutcome::NotFound) => {
                warn!(%workspace_id, checkout_id, "checkout references unknown workspace");
                Ok(None)
            }
            Err(err) => {
                error!(?err, %workspace_id, checkout_id, "failed to persist workspace upgrade");
                Ok(None)
            }
        }
    }

    /// Runs the plan mutation for a first-seen webhook event.
    pub async fn apply_webhook_event(
        &self,
        event: &WebhookEvent,
    ) -> Result<WebhookOutcome, WebhookDispatchError> {
        match &event.action {
            WebhookAction::CheckoutCompleted { checkout_id } => Ok(WebhookOutcome::Upgraded(
                self.handle_successful_payment(checkout_id).await?,
            )),
            WebhookAction::SubscriptionCancelled { customer_id } => {
                self.downgrade(&event.id, customer_id.as_deref(), DowngradeRule::Always)
                    .await
            }
            WebhookAction::PaymentFailed { customer_id } => {
                self.downgrade(&event.id, customer_id.as_deref(), DowngradeRule::OnlyIfPro)
                    .await
            }
            WebhookAction::Ignored => Ok(WebhookOutcome::Ignored),
        }
    }

    async fn downgrade(
        &self,
        event_id: &str,
        customer_id: Option<&str>,
        rule: DowngradeRule,
    ) -> Result<WebhookOutcome, WebhookDispatchError> {
        let Some(customer_id) = customer_id else {
            warn!(event_id, "billing event carries no customer id");
            return Ok(WebhookOutcome::Ignored);
        };

        let changed = self
            .workspace_repo
            .downgrade_by_customer(customer_id, rule)
            .await?;

        if changed.is_empty() {
            info!(event_id, customer_id, ?rule, "no workspace needed a downgrade");
        }
        for workspace in &changed {
            info!(event_id, customer_id, workspace_id = %workspace.id, ?rule, "workspace downgraded to free");
        }

        Ok(WebhookOutcome::Downgraded(
            changed.into_iter().map(|w| w.id).collect(),
        ))
    }
}

// Small helper: nested json lookup
pub(crate) fn jget<'a>(val: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = val;
    for key in path {
        cur = cur.get(*key)?;
    }
    Some(cur)
}

pub(crate) fn extract_str(val: &Value, path: &[&str]) -> Option<String> {
    jget(val, path)?.as_str().map(str::to_string)
}

/// Stripe serializes expandable references either as an id string or as the
/// expanded object.
pub(crate) fn expandable_id(val: Option<&Value>) -> Option<String> {
    match val? {
        Value::String(id) => Some(id.clone()),
        Value::Object(obj) => obj.get("id")?.as_str().map(str::to_string),
        _ => None,
    }
}
