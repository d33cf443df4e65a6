use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use uuid::Uuid;

use super::stripe::stripe_event_from_parts;
use super::{
    extract_str, BillingError, BillingProvider, CheckoutState, HostedSession, WebhookError,
    WebhookEvent,
};
use crate::config::BillingProviderKind;

pub const MOCK_SIGNATURE_HEADER: &str = "x-mock-signature";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    pub workspace_id: Uuid,
    pub user_email: String,
    pub base_url: String,
}

/// Test double that accepts Stripe-shaped payloads signed with
/// `x-mock-signature: valid`.
#[derive(Default)]
pub struct MockBillingProvider {
    pub checkouts: Mutex<HashMap<String, CheckoutState>>,
    pub upgrade_requests: Mutex<Vec<UpgradeRequest>>,
    pub portal_requests: Mutex<Vec<(String, Uuid)>>,
    pub fail_requests: bool,
    pub unconfigured: bool,
    pub delay: Option<Duration>,
}

impl MockBillingProvider {
    pub fn set_checkout(&self, id: &str, state: CheckoutState) {
        self.checkouts.lock().unwrap().insert(id.to_string(), state);
    }

    async fn preflight(&self) -> Result<(), BillingError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unconfigured {
            return Err(BillingError::Config("mock provider not configured".into()));
        }
        if self.fail_requests {
            return Err(BillingError::Api("mock provider failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    fn kind(&self) -> BillingProviderKind {
        BillingProviderKind::Stripe
    }

    async fn create_upgrade_session(
        &self,
        workspace_id: Uuid,
        user_email: &str,
        base_url: &str,
    ) -> Result<HostedSession, BillingError> {
        self.preflight().await?;
        self.upgrade_requests.lock().unwrap().push(UpgradeRequest {
            workspace_id,
            user_email: user_email.to_string(),
            base_url: base_url.to_string(),
        });
        Ok(HostedSession {
            id: format!("cs_test_{}", workspace_id.simple()),
            url: format!("https://checkout.example.test/{workspace_id}"),
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        workspace_id: Uuid,
        _base_url: &str,
    ) -> Result<HostedSession, BillingError> {
        self.preflight().await?;
        self.portal_requests
            .lock()
            .unwrap()
            .push((customer_id.to_string(), workspace_id));
        Ok(HostedSession {
            id: "bps_test".into(),
            url: format!("https://portal.example.test/{customer_id}"),
        })
    }

    async fn fetch_checkout(&self, checkout_id: &str) -> Result<CheckoutState, BillingError> {
        self.preflight().await?;
        self.checkouts
            .lock()
            .unwrap()
            .get(checkout_id)
            .cloned()
            .ok_or_else(|| BillingError::Api(format!("no such checkout: {checkout_id}")))
    }

    fn verify_webhook(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<WebhookEvent, WebhookError> {
        if self.unconfigured {
            return Err(WebhookError::NotConfigured);
        }
        match headers.get(MOCK_SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) {
            Some("valid") => {}
            _ => return Err(WebhookError::Invalid("bad signature".into())),
        }
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| WebhookError::Invalid(e.to_string()))?;
        let id = extract_str(&value, &["id"])
            .ok_or_else(|| WebhookError::Invalid("event id missing".into()))?;
        let event_type = extract_str(&value, &["type"]).unwrap_or_default();
        Ok(stripe_event_from_parts(id, event_type, &value))
    }
}
