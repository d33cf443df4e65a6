use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::db::{unique_violation_constraint, user_repository::UserRepository};
use crate::models::user::{NewUser, User, UserConflict, UserMutation, UserUpdate};

pub(crate) const USER_COLUMNS: &str = "id, email, username, name, password_hash, is_superadmin, \
    active, last_login_at, current_login_at, last_login_ip, current_login_ip, login_count, \
    created_at";

/// Transaction-scoped advisory lock serializing every superadmin mutation.
const SUPERADMIN_LOCK_KEY: i64 = 0x5355_5045_5241_444D;

pub struct PostgresUserRepository {
    pub pool: PgPool,
}

pub(crate) async fn lock_superadmins(conn: &mut PgConnection) -> Result<i64, sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SUPERADMIN_LOCK_KEY)
        .execute(&mut *conn)
        .await?;

    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE is_superadmin")
        .fetch_one(&mut *conn)
        .await
}

pub(crate) fn user_conflict(err: &sqlx::Error) -> Option<UserConflict> {
    let constraint = unique_violation_constraint(err)?;
    if constraint.contains("username") {
        Some(UserConflict::Username)
    } else {
        Some(UserConflict::Email)
    }
}

pub(crate) async fn insert_user(
    conn: &mut PgConnection,
    new_user: &NewUser,
) -> Result<User, sqlx::Error> {
    let sql = format!(
        "INSERT INTO users (id, email, username, name, password_hash, is_superadmin) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
    );
    sqlx::query_as::<_, User>(&sql)
        .bind(Uuid::new_v4())
        .bind(&new_user.email)
        .bind(&new_user.username)
        .bind(&new_user.name)
        .bind(&new_user.password_hash)
        .bind(new_user.is_superadmin)
        .fetch_one(conn)
        .await
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)");
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create_user(&self, new_user: &NewUser) -> Result<UserMutation<User>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        if new_user.is_superadmin && lock_superadmins(&mut tx).await? > 0 {
            return Ok(UserMutation::SecondSuperadmin);
        }

        let user = match insert_user(&mut tx, new_user).await {
            Ok(user) => user,
            Err(err) => {
                if let Some(conflict) = user_conflict(&err) {
                    return Ok(UserMutation::Conflict(conflict));
                }
                return Err(err);
            }
        };

        tx.commit().await?;
        Ok(UserMutation::Applied(user))
    }

    async fn update_user(
        &self,
        user_id: Uuid,
        update: &UserUpdate,
    ) -> Result<UserMutation<User>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let superadmins = match update.is_superadmin {
            Some(_) => Some(lock_superadmins(&mut tx).await?),
            None => None,
        };

        let current = sqlx::query_scalar::<_, bool>(
            "SELECT is_superadmin FROM users WHERE id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(currently_superadmin) = current else {
            return Ok(UserMutation::NotFound);
        };

        if let (Some(requested), Some(count)) = (update.is_superadmin, superadmins) {
            if requested && !currently_superadmin && count > 0 {
                return Ok(UserMutation::SecondSuperadmin);
            }
            if !requested && currently_superadmin && count <= 1 {
                return Ok(UserMutation::LastSuperadmin);
            }
        }

        let sql = format!(
            "UPDATE users SET name = COALESCE($2, name), active = COALESCE($3, active), \
             is_superadmin = COALESCE($4, is_superadmin) WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(&update.name)
            .bind(update.active)
            .bind(update.is_superadmin)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(UserMutation::Applied(user))
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<UserMutation<()>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let superadmins = lock_superadmins(&mut tx).await?;

        let current = sqlx::query_scalar::<_, bool>(
            "SELECT is_superadmin FROM users WHERE id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        match current {
            None => return Ok(UserMutation::NotFound),
            Some(true) if superadmins <= 1 => return Ok(UserMutation::LastSuperadmin),
            Some(_) => {}
        }

        // memberships, keys and audit rows of owned workspaces cascade
        sqlx::query("DELETE FROM workspaces WHERE owner_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(UserMutation::Applied(()))
    }

    async fn record_login(&self, user_id: Uuid, ip: Option<&str>) -> Result<User, sqlx::Error> {
        let sql = format!(
            "UPDATE users SET last_login_at = current_login_at, last_login_ip = current_login_ip, \
             current_login_at = now(), current_login_ip = $2, login_count = login_count + 1 \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(ip)
            .fetch_one(&self.pool)
            .await
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_users(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pool against a disposable database named by `TEST_DATABASE_URL`.
    async fn test_pg_pool() -> Option<PgPool> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = PgPool::connect(&url).await.expect("test database should accept connections");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations should apply");
        Some(pool)
    }

    fn user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            username: None,
            name: None,
            password_hash: "hash".to_string(),
            is_superadmin: false,
        }
    }

    async fn applied(repo: &PostgresUserRepository, email: &str) -> User {
        match repo.create_user(&user(email)).await.unwrap() {
            UserMutation::Applied(user) => user,
            _ => panic!("user should be created"),
        }
    }

    #[tokio::test]
    #[ignore = "requires Postgres; set TEST_DATABASE_URL to a disposable database"]
    async fn concurrent_demotes_keep_one_superadmin_in_postgres() {
        let Some(pool) = test_pg_pool().await else {
            eprintln!("SKIP: TEST_DATABASE_URL is not set");
            return;
        };
        let repo = std::sync::Arc::new(PostgresUserRepository { pool: pool.clone() });
        let run = Uuid::new_v4().simple().to_string();
        let a = applied(&repo, &format!("a-{run}@example.com")).await;
        let b = applied(&repo, &format!("b-{run}@example.com")).await;

        // seed two superadmins directly, the state the API refuses to create
        sqlx::query("UPDATE users SET is_superadmin = (id = ANY($1))")
            .bind(vec![a.id, b.id])
            .execute(&pool)
            .await
            .unwrap();

        let demote = UserUpdate {
            is_superadmin: Some(false),
            ..Default::default()
        };
        let (first, second) = tokio::join!(
            {
                let repo = repo.clone();
                let demote = demote.clone();
                async move { repo.update_user(a.id, &demote).await }
            },
            {
                let repo = repo.clone();
                let demote = demote.clone();
                async move { repo.update_user(b.id, &demote).await }
            }
        );
        let outcomes = [first.unwrap(), second.unwrap()];
        let applied_count = outcomes
            .iter()
            .filter(|o| matches!(o, UserMutation::Applied(_)))
            .count();
        let refused = outcomes
            .iter()
            .filter(|o| matches!(o, UserMutation::LastSuperadmin))
            .count();
        assert_eq!((applied_count, refused), (1, 1));

        let remaining: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_superadmin")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(remaining, 1);
    }
}
