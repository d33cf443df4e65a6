use async_trait::async_trait;
use uuid::Uuid;

use crate::models::session::{NewSession, UserSession};

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Same token refreshes metadata and reactivates; a new token inserts.
    async fn upsert_session(&self, session: &NewSession) -> Result<UserSession, sqlx::Error>;

    async fn find_active_session(&self, token: &str)
        -> Result<Option<UserSession>, sqlx::Error>;

    async fn touch_session(&self, token: &str) -> Result<(), sqlx::Error>;

    async fn set_current_workspace(
        &self,
        token: &str,
        workspace_id: Option<Uuid>,
    ) -> Result<(), sqlx::Error>;

    async fn deactivate_session(&self, token: &str) -> Result<(), sqlx::Error>;

    /// Deactivates every active session of the user except `keep_token`.
    async fn deactivate_other_sessions(
        &self,
        user_id: Uuid,
        keep_token: Option<&str>,
    ) -> Result<u64, sqlx::Error>;

    async fn list_active_sessions(&self, user_id: Uuid) -> Result<Vec<UserSession>, sqlx::Error>;
}
