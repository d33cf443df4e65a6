use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::db::{
    activity_repository::ActivityRepository, session_repository::SessionRepository,
    user_repository::UserRepository,
};
use crate::models::activity::{NewActivity, ACTION_LOGIN_FROM_NEW_IP, ACTION_PASSWORD_CHANGED};
use crate::models::session::NewSession;

#[derive(Debug, Clone, PartialEq)]
pub struct LoginContext {
    pub user_id: Uuid,
    pub session_token: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
}

/// Side effects that run synchronously after authentication events. An error
/// fails the request that triggered it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthHooks: Send + Sync {
    async fn on_authenticated(&self, ctx: &LoginContext) -> Result<(), sqlx::Error>;

    async fn on_password_changed(
        &self,
        user_id: Uuid,
        ip: Option<String>,
    ) -> Result<(), sqlx::Error>;

    async fn on_logged_out(&self, session_token: &str) -> Result<(), sqlx::Error>;
}

pub struct SessionAuditHooks {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    activities: Arc<dyn ActivityRepository>,
    disable_multiple_sessions: bool,
}

impl SessionAuditHooks {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        activities: Arc<dyn ActivityRepository>,
        disable_multiple_sessions: bool,
    ) -> Self {
        Self {
            users,
            sessions,
            activities,
            disable_multiple_sessions,
        }
    }
}

#[async_trait]
impl AuthHooks for SessionAuditHooks {
    async fn on_authenticated(&self, ctx: &LoginContext) -> Result<(), sqlx::Error> {
        let user = self
            .users
            .record_login(ctx.user_id, ctx.ip.as_deref())
            .await?;

        let meta = match &ctx.user_agent {
            Some(agent) => json!({ "user_agent": agent }),
            None => Value::Object(Default::default()),
        };
        self.sessions
            .upsert_session(&NewSession {
                user_id: ctx.user_id,
                session_token: ctx.session_token.clone(),
                expires_at: ctx.expires_at,
                ip_address: ctx.ip.clone(),
                meta,
            })
            .await?;

        // last_login_ip now holds the address of the previous login
        if let (Some(previous), Some(current)) = (user.last_login_ip.as_deref(), ctx.ip.as_deref())
        {
            if previous != current {
                info!(user_id = %ctx.user_id, previous, current, "login from new ip");
                self.activities
                    .record(
                        &NewActivity::new(ctx.user_id, ACTION_LOGIN_FROM_NEW_IP)
                            .with_data(json!({ "previous_ip": previous, "ip": current })),
                    )
                    .await?;
            }
        }

        if self.disable_multiple_sessions {
            let closed = self
                .sessions
                .deactivate_other_sessions(ctx.user_id, Some(&ctx.session_token))
                .await?;
            if closed > 0 {
                info!(user_id = %ctx.user_id, closed, "closed other sessions on login");
            }
        }

        Ok(())
    }

    async fn on_password_changed(
        &self,
        user_id: Uuid,
        ip: Option<String>,
    ) -> Result<(), sqlx::Error> {
        self.activities
            .record(&NewActivity::new(user_id, ACTION_PASSWORD_CHANGED).with_data(json!({ "ip": ip })))
            .await
    }

    async fn on_logged_out(&self, session_token: &str) -> Result<(), sqlx::Error> {
        self.sessions.deactivate_session(session_token).await
    }
}
