use async_trait::async_trait;
use uuid::Uuid;

use crate::db::scope::WorkspaceScope;
use crate::models::api_key::ApiKey;

#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn create_key(
        &self,
        scope: &WorkspaceScope,
        user_id: Uuid,
        name: &str,
        prefix: &str,
        key_hash: &str,
    ) -> Result<ApiKey, sqlx::Error>;

    async fn list_keys(&self, scope: &WorkspaceScope) -> Result<Vec<ApiKey>, sqlx::Error>;

    /// Soft revoke. Returns `false` if the key is not in this workspace.
    async fn revoke_key(&self, scope: &WorkspaceScope, key_id: Uuid) -> Result<bool, sqlx::Error>;

    async fn find_active_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, sqlx::Error>;

    async fn touch_last_used(&self, key_id: Uuid) -> Result<(), sqlx::Error>;

    async fn count_active_keys(&self) -> Result<i64, sqlx::Error>;
}
