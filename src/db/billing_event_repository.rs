use async_trait::async_trait;

use crate::models::billing_event::BillingEvent;

#[async_trait]
pub trait BillingEventRepository: Send + Sync {
    /// Inserts the ledger row and returns it. `None` means the event id was
    /// already present; the uniqueness check is the insert itself.
    async fn record_event(
        &self,
        event_id: &str,
        event_type: Option<&str>,
        provider: &str,
    ) -> Result<Option<BillingEvent>, sqlx::Error>;
}
