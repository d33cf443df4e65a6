use async_trait::async_trait;
use uuid::Uuid;

use crate::models::user::{NewUser, User, UserMutation, UserUpdate};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error>;

    /// Inserts a user. A superadmin insert is rejected when one already exists;
    /// the check and the insert share one transaction.
    async fn create_user(&self, new_user: &NewUser) -> Result<UserMutation<User>, sqlx::Error>;

    /// Applies the update atomically with the single-superadmin checks.
    async fn update_user(
        &self,
        user_id: Uuid,
        update: &UserUpdate,
    ) -> Result<UserMutation<User>, sqlx::Error>;

    /// Deletes the user together with every workspace they own.
    async fn delete_user(&self, user_id: Uuid) -> Result<UserMutation<()>, sqlx::Error>;

    /// Shifts current login metadata to "last" and stamps the new login.
    /// Returns the user as it looks after the update.
    async fn record_login(&self, user_id: Uuid, ip: Option<&str>) -> Result<User, sqlx::Error>;

    async fn update_password(&self, user_id: Uuid, password_hash: &str)
        -> Result<(), sqlx::Error>;

    async fn count_users(&self) -> Result<i64, sqlx::Error>;
}
