use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde_json::{json, Value};
use subtle::ConstantTimeEq;
use tracing::{error, warn};
use uuid::Uuid;

use super::{
    extract_str, BillingError, BillingProvider, CheckoutState, HostedSession, WebhookAction,
    WebhookError, WebhookEvent,
};
use crate::config::{BillingProviderKind, ChargebeeSettings};

pub struct ChargebeeBillingProvider {
    client: Client,
    api_base: Option<String>,
    api_key: Option<String>,
    pro_item_price_id: Option<String>,
    webhook_username: Option<String>,
    webhook_password: Option<String>,
    insecure_dev_webhooks: bool,
}

impl ChargebeeBillingProvider {
    pub fn from_settings(
        settings: &ChargebeeSettings,
        timeout: Duration,
        insecure_dev_webhooks: bool,
    ) -> Result<Self, BillingError> {
        let client = Client::builder().timeout(timeout).build()?;
        let api_base = settings
            .api_base_url
            .clone()
            .or_else(|| {
                settings
                    .site
                    .as_ref()
                    .map(|site| format!("https://{site}.chargebee.com/api/v2"))
            })
            .map(|base| base.trim_end_matches('/').to_string());

        Ok(Self {
            client,
            api_base,
            api_key: settings.api_key.clone(),
            pro_item_price_id: settings.pro_item_price_id.clone(),
            webhook_username: settings.webhook_username.clone(),
            webhook_password: settings.webhook_password.clone(),
            insecure_dev_webhooks,
        })
    }

    fn credentials(&self) -> Result<(&str, &str), BillingError> {
        let base = self
            .api_base
            .as_deref()
            .ok_or_else(|| BillingError::Config("CHARGEBEE_SITE is not set".into()))?;
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| BillingError::Config("CHARGEBEE_API_KEY is not set".into()))?;
        Ok((base, key))
    }

    async fn post_form(&self, path: &str, form: &[(&str, String)]) -> Result<Value, BillingError> {
        let (base, key) = self.credentials()?;
        let resp = self
            .client
            .post(format!("{base}/{path}"))
            .basic_auth(key, Some(""))
            .form(form)
            .send()
            .await?;
        read_json(resp).await
    }

    async fn get_json(&self, path: &str) -> Result<Value, BillingError> {
        let (base, key) = self.credentials()?;
        let resp = self
            .client
            .get(format!("{base}/{path}"))
            .basic_auth(key, Some(""))
            .send()
            .await?;
        read_json(resp).await
    }

    fn webhook_authorized(&self, headers: &HeaderMap) -> Result<(), WebhookError> {
        let (Some(expected_user), Some(expected_pass)) = (
            self.webhook_username.as_deref(),
            self.webhook_password.as_deref(),
        ) else {
            if self.insecure_dev_webhooks {
                warn!("accepting unauthenticated chargebee webhook (INSECURE_DEV_WEBHOOKS)");
                return Ok(());
            }
            error!("chargebee webhook credentials are not configured; rejecting delivery");
            return Err(WebhookError::Unauthorized);
        };

        let supplied = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Basic "))
            .and_then(|encoded| STANDARD.decode(encoded.trim()).ok())
            .ok_or(WebhookError::Unauthorized)?;

        let expected = format!("{expected_user}:{expected_pass}");
        if bool::from(supplied.as_slice().ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err(WebhookError::Unauthorized)
        }
    }
}

async fn read_json(resp: reqwest::Response) -> Result<Value, BillingError> {
    let status = resp.status();
    let body: Value = resp
        .json()
        .await
        .map_err(|e| BillingError::Serde(e.to_string()))?;
    if !status.is_success() {
        let message = extract_str(&body, &["message"]).unwrap_or_else(|| status.to_string());
        return Err(BillingError::Api(message));
    }
    Ok(body)
}

#[async_trait]
impl BillingProvider for ChargebeeBillingProvider {
    fn kind(&self) -> BillingProviderKind {
        BillingProviderKind::Chargebee
    }

    async fn create_upgrade_session(
        &self,
        workspace_id: Uuid,
        user_email: &str,
        base_url: &str,
    ) -> Result<HostedSession, BillingError> {
        let item_price = self.pro_item_price_id.clone().ok_or_else(|| {
            BillingError::Config("CHARGEBEE_PRO_ITEM_PRICE_ID is not set".into())
        })?;

        let form = [
            ("subscription_items[item_price_id][0]", item_price),
            ("subscription_items[quantity][0]", "1".to_string()),
            ("customer[email]", user_email.to_string()),
            (
                "pass_thru_content",
                json!({ "workspace_id": workspace_id.to_string() }).to_string(),
            ),
            ("redirect_url", format!("{base_url}billing/success")),
            ("cancel_url", format!("{base_url}dashboard")),
        ];
        let body = self
            .post_form("hosted_pages/checkout_new_for_items", &form)
            .await?;

        Ok(HostedSession {
            id: required(&body, &["hosted_page", "id"])?,
            url: required(&body, &["hosted_page", "url"])?,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        workspace_id: Uuid,
        base_url: &str,
    ) -> Result<HostedSession, BillingError> {
        let form = [
            ("customer[id]", customer_id.to_string()),
            (
                "redirect_url",
                format!("{base_url}workspace/{workspace_id}/settings"),
            ),
        ];
        let body = self.post_form("portal_sessions", &form).await?;

        Ok(HostedSession {
            id: required(&body, &["portal_session", "id"])?,
            url: required(&body, &["portal_session", "access_url"])?,
        })
    }

    async fn fetch_checkout(&self, checkout_id: &str) -> Result<CheckoutState, BillingError> {
        let id = checkout_id.trim();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(BillingError::InvalidId(checkout_id.to_string()));
        }
        let body = self.get_json(&format!("hosted_pages/{id}")).await?;
        Ok(checkout_state_from_hosted_page(&body))
    }

    fn verify_webhook(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<WebhookEvent, WebhookError> {
        self.webhook_authorized(headers)?;

        let event: Value =
            serde_json::from_slice(body).map_err(|e| WebhookError::Invalid(e.to_string()))?;
        let id = extract_str(&event, &["id"])
            .ok_or_else(|| WebhookError::Invalid("event id missing".into()))?;
        let event_type = extract_str(&event, &["event_type"])
            .ok_or_else(|| WebhookError::Invalid("event_type missing".into()))?;

        let customer_id = || extract_str(&event, &["content", "customer", "id"]);
        let action = match event_type.as_str() {
            "subscription_cancelled" => WebhookAction::SubscriptionCancelled {
                customer_id: customer_id(),
            },
            "payment_failed" => WebhookAction::PaymentFailed {
                customer_id: customer_id(),
            },
            _ => WebhookAction::Ignored,
        };

        Ok(WebhookEvent {
            id,
            event_type,
            action,
        })
    }
}

fn required(body: &Value, path: &[&str]) -> Result<String, BillingError> {
    extract_str(body, path)
        .ok_or_else(|| BillingError::Serde(format!("missing {}", path.join("."))))
}

pub(crate) fn checkout_state_from_hosted_page(body: &Value) -> CheckoutState {
    let state = extract_str(body, &["hosted_page", "state"]).unwrap_or_default();
    if state != "succeeded" {
        return CheckoutState::Pending { status: state };
    }

    // pass_thru_content is stored by Chargebee as an opaque string
    let workspace_id = extract_str(body, &["hosted_page", "pass_thru_content"])
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        .and_then(|content| extract_str(&content, &["workspace_id"]));

    CheckoutState::Succeeded {
        workspace_id,
        customer_id: extract_str(body, &["hosted_page", "content", "customer", "id"]),
    }
}
