use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::session_repository::SessionRepository;
use crate::models::session::{NewSession, UserSession};

const SESSION_COLUMNS: &str = "id, user_id, session_token, current_workspace_id, last_active, \
    expires_at, ip_address, meta, is_active, created_at";

pub struct PostgresSessionRepository {
    pub pool: PgPool,
}

#[async_trait]
impl SessionRepository for PostgresSessionRepository {
    async fn upsert_session(&self, session: &NewSession) -> Result<UserSession, sqlx::Error> {
        let sql = format!(
            "INSERT INTO user_sessions (id, user_id, session_token, expires_at, ip_address, meta) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (session_token) DO UPDATE \
             SET last_active = now(), expires_at = EXCLUDED.expires_at, \
                 ip_address = EXCLUDED.ip_address, meta = EXCLUDED.meta, is_active = TRUE \
             RETURNING {SESSION_COLUMNS}"
        );
        sqlx::query_as::<_, UserSession>(&sql)
            .bind(Uuid::new_v4())
            .bind(session.user_id)
            .bind(&session.session_token)
            .bind(session.expires_at)
            .bind(&session.ip_address)
            .bind(&session.meta)
            .fetch_one(&self.pool)
            .await
    }

    async fn find_active_session(
        &self,
        token: &str,
    ) -> Result<Option<UserSession>, sqlx::Error> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM user_sessions WHERE session_token = $1 AND is_active"
        );
        sqlx::query_as::<_, UserSession>(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await
    }

    async fn touch_session(&self, token: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE user_sessions SET last_active = now() WHERE session_token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_current_workspace(
        &self,
        token: &str,
        workspace_id: Option<Uuid>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE user_sessions SET current_workspace_id = $2 WHERE session_token = $1")
            .bind(token)
            .bind(workspace_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn deactivate_session(&self, token: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE user_sessions SET is_active = FALSE WHERE session_token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn deactivate_other_sessions(
        &self,
        user_id: Uuid,
        keep_token: Option<&str>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE user_sessions
            SET is_active = FALSE
            WHERE user_id = $1
              AND is_active
              AND ($2::text IS NULL OR session_token <> $2)
            "#,
        )
        .bind(user_id)
        .bind(keep_token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_active_sessions(&self, user_id: Uuid) -> Result<Vec<UserSession>, sqlx::Error> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM user_sessions WHERE user_id = $1 AND is_active \
             ORDER BY last_active DESC"
        );
        sqlx::query_as::<_, UserSession>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
    }
}
