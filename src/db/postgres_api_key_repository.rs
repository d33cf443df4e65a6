use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{api_key_repository::ApiKeyRepository, scope::WorkspaceScope};
use crate::models::api_key::ApiKey;

const API_KEY_COLUMNS: &str =
    "id, workspace_id, user_id, name, prefix, key_hash, is_active, last_used_at, created_at";

pub struct PostgresApiKeyRepository {
    pub pool: PgPool,
}

#[async_trait]
impl ApiKeyRepository for PostgresApiKeyRepository {
    async fn create_key(
        &self,
        scope: &WorkspaceScope,
        user_id: Uuid,
        name: &str,
        prefix: &str,
        key_hash: &str,
    ) -> Result<ApiKey, sqlx::Error> {
        let sql = format!(
            "INSERT INTO api_keys (id, workspace_id, user_id, name, prefix, key_hash) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {API_KEY_COLUMNS}"
        );
        sqlx::query_as::<_, ApiKey>(&sql)
            .bind(Uuid::new_v4())
            .bind(scope.workspace_id())
            .bind(user_id)
            .bind(name)
            .bind(prefix)
            .bind(key_hash)
            .fetch_one(&self.pool)
            .await
    }

    async fn list_keys(&self, scope: &WorkspaceScope) -> Result<Vec<ApiKey>, sqlx::Error> {
        let sql = format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys WHERE workspace_id = $1 \
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, ApiKey>(&sql)
            .bind(scope.workspace_id())
            .fetch_all(&self.pool)
            .await
    }

    async fn revoke_key(&self, scope: &WorkspaceScope, key_id: Uuid) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE api_keys SET is_active = FALSE WHERE id = $1 AND workspace_id = $2")
                .bind(key_id)
                .bind(scope.workspace_id())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_active_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, sqlx::Error> {
        let sql =
            format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE key_hash = $1 AND is_active");
        sqlx::query_as::<_, ApiKey>(&sql)
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await
    }

    async fn touch_last_used(&self, key_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE api_keys SET last_used_at = now() WHERE id = $1")
            .bind(key_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_active_keys(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM api_keys WHERE is_active")
            .fetch_one(&self.pool)
            .await
    }
}
