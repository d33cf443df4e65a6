use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{activity_repository::ActivityRepository, scope::WorkspaceScope};
use crate::models::activity::{Activity, NewActivity};

pub struct PostgresActivityRepository {
    pub pool: PgPool,
}

#[async_trait]
impl ActivityRepository for PostgresActivityRepository {
    async fn record(&self, activity: &NewActivity) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO activities (id, user_id, workspace_id, action, data)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(activity.user_id)
        .bind(activity.workspace_id)
        .bind(&activity.action)
        .bind(&activity.data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_workspace(
        &self,
        scope: &WorkspaceScope,
        limit: i64,
    ) -> Result<Vec<Activity>, sqlx::Error> {
        sqlx::query_as::<_, Activity>(
            r#"
            SELECT id, user_id, workspace_id, action, data, created_at
            FROM activities
            WHERE workspace_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(scope.workspace_id())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
