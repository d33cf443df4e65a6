use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::billing_event_repository::BillingEventRepository;
use crate::models::billing_event::BillingEvent;

pub struct PostgresBillingEventRepository {
    pub pool: PgPool,
}

#[async_trait]
impl BillingEventRepository for PostgresBillingEventRepository {
    async fn record_event(
        &self,
        event_id: &str,
        event_type: Option<&str>,
        provider: &str,
    ) -> Result<Option<BillingEvent>, sqlx::Error> {
        sqlx::query_as::<_, BillingEvent>(
            r#"
            INSERT INTO billing_events (id, event_id, event_type, provider)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id) DO NOTHING
            RETURNING id, event_id, event_type, provider, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(event_type)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await
    }
}
