use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub const ACTION_LOGIN_FROM_NEW_IP: &str = "Login from new IP";
pub const ACTION_PASSWORD_CHANGED: &str = "Password Changed";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Activity {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub workspace_id: Option<Uuid>,
    pub action: String,
    pub data: Option<Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub user_id: Option<Uuid>,
    pub workspace_id: Option<Uuid>,
    pub action: String,
    pub data: Option<Value>,
}

impl NewActivity {
    pub fn new(user_id: Uuid, action: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id),
            workspace_id: None,
            action: action.into(),
            data: None,
        }
    }

    pub fn in_workspace(mut self, workspace_id: Uuid) -> Self {
        self.workspace_id = Some(workspace_id);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}
