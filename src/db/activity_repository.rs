use async_trait::async_trait;

use crate::db::scope::WorkspaceScope;
use crate::models::activity::{Activity, NewActivity};

#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn record(&self, activity: &NewActivity) -> Result<(), sqlx::Error>;

    async fn list_for_workspace(
        &self,
        scope: &WorkspaceScope,
        limit: i64,
    ) -> Result<Vec<Activity>, sqlx::Error>;
}
