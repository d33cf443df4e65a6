use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde_json::Value;
use uuid::Uuid;

use super::{
    expandable_id, extract_str, jget, BillingError, BillingProvider, CheckoutState, HostedSession,
    WebhookAction, WebhookError, WebhookEvent,
};
use crate::config::{BillingProviderKind, StripeSettings};

pub const STRIPE_SIGNATURE_HEADER: &str = "Stripe-Signature";

pub struct StripeBillingProvider {
    client: Option<stripe::Client>,
    webhook_secret: Option<String>,
    pro_price_id: Option<String>,
}

impl StripeBillingProvider {
    pub fn from_settings(settings: &StripeSettings) -> Self {
        Self {
            client: settings.secret_key.clone().map(stripe::Client::new),
            webhook_secret: settings.webhook_secret.clone(),
            pro_price_id: settings.pro_price_id.clone(),
        }
    }

    fn client(&self) -> Result<&stripe::Client, BillingError> {
        self.client
            .as_ref()
            .ok_or_else(|| BillingError::Config("STRIPE_SECRET_KEY is not set".into()))
    }
}

#[async_trait]
impl BillingProvider for StripeBillingProvider {
    fn kind(&self) -> BillingProviderKind {
        BillingProviderKind::Stripe
    }

    async fn create_upgrade_session(
        &self,
        workspace_id: Uuid,
        user_email: &str,
        base_url: &str,
    ) -> Result<HostedSession, BillingError> {
        let client = self.client()?;
        let price = self
            .pro_price_id
            .as_deref()
            .ok_or_else(|| BillingError::Config("STRIPE_PRO_PRICE_ID is not set".into()))?;

        let workspace_ref = workspace_id.to_string();
        let success_url = format!("{base_url}billing/success?session_id={{CHECKOUT_SESSION_ID}}");
        let cancel_url = format!("{base_url}dashboard");

        let mut params = stripe::CreateCheckoutSession::new();
        params.mode = Some(stripe::CheckoutSessionMode::Subscription);
        params.success_url = Some(&success_url);
        params.cancel_url = Some(&cancel_url);
        params.customer_email = Some(user_email);
        params.client_reference_id = Some(&workspace_ref);
        params.metadata = Some(HashMap::from([(
            "workspace_id".to_string(),
            workspace_ref.clone(),
        )]));
        params.line_items = Some(vec![stripe::CreateCheckoutSessionLineItems {
            price: Some(price.to_string()),
            quantity: Some(1),
            ..Default::default()
        }]);

        let session = stripe::CheckoutSession::create(client, params).await?;
        let url = session
            .url
            .clone()
            .ok_or_else(|| BillingError::Serde("checkout session has no url".into()))?;
        Ok(HostedSession {
            id: session.id.to_string(),
            url,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        workspace_id: Uuid,
        base_url: &str,
    ) -> Result<HostedSession, BillingError> {
        let client = self.client()?;
        let customer = customer_id
            .parse::<stripe::CustomerId>()
            .map_err(|e| BillingError::InvalidId(e.to_string()))?;
        let return_url = format!("{base_url}workspace/{workspace_id}/settings");

        let mut params = stripe::CreateBillingPortalSession::new(customer);
        params.return_url = Some(&return_url);

        let session = stripe::BillingPortalSession::create(client, params).await?;
        Ok(HostedSession {
            id: session.id.to_string(),
            url: session.url,
        })
    }

    async fn fetch_checkout(&self, checkout_id: &str) -> Result<CheckoutState, BillingError> {
        let client = self.client()?;
        let id = checkout_id
            .parse::<stripe::CheckoutSessionId>()
            .map_err(|e| BillingError::InvalidId(e.to_string()))?;
        let session = stripe::CheckoutSession::retrieve(client, &id, &[]).await?;
        let value =
            serde_json::to_value(&session).map_err(|e| BillingError::Serde(e.to_string()))?;
        Ok(checkout_state_from_stripe(&value))
    }

    fn verify_webhook(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<WebhookEvent, WebhookError> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or(WebhookError::NotConfigured)?;
        let signature = headers
            .get(STRIPE_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| WebhookError::Invalid("missing Stripe-Signature header".into()))?;
        let payload =
            std::str::from_utf8(body).map_err(|e| WebhookError::Invalid(e.to_string()))?;

        let event = stripe::Webhook::construct_event(payload, signature, secret)
            .map_err(|e| WebhookError::Invalid(e.to_string()))?;
        let value =
            serde_json::to_value(&event).map_err(|e| WebhookError::Invalid(e.to_string()))?;

        Ok(stripe_event_from_parts(
            event.id.to_string(),
            event.type_.to_string(),
            &value,
        ))
    }
}

/// Paid means the session finished and either collected money or needed none.
pub(crate) fn checkout_state_from_stripe(session: &Value) -> CheckoutState {
    let status = extract_str(session, &["status"]).unwrap_or_default();
    let payment_status = extract_str(session, &["payment_status"]).unwrap_or_default();

    let paid = status == "complete"
        && matches!(payment_status.as_str(), "paid" | "no_payment_required");
    if !paid {
        return CheckoutState::Pending {
            status: format!("{status}/{payment_status}"),
        };
    }

    CheckoutState::Succeeded {
        workspace_id: extract_str(session, &["metadata", "workspace_id"]),
        customer_id: expandable_id(session.get("customer")),
    }
}

pub(crate) fn stripe_event_from_parts(id: String, event_type: String, event: &Value) -> WebhookEvent {
    let object = jget(event, &["data", "object"]);
    let customer_id = || expandable_id(object.and_then(|o| o.get("customer")));

    let action = match event_type.as_str() {
        "checkout.session.completed" => {
            match object.and_then(|o| o.get("id")).and_then(Value::as_str) {
                Some(checkout_id) => WebhookAction::CheckoutCompleted {
                    checkout_id: checkout_id.to_string(),
                },
                None => WebhookAction::Ignored,
            }
        }
        "customer.subscription.deleted" => WebhookAction::SubscriptionCancelled {
            customer_id: customer_id(),
        },
        "invoice.payment_failed" => WebhookAction::PaymentFailed {
            customer_id: customer_id(),
        },
        _ => WebhookAction::Ignored,
    };

    WebhookEvent {
        id,
        event_type,
        action,
    }
}
