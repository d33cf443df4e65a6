use std::env;

use anyhow::{bail, Context, Result};
use sqlx::postgres::PgPoolOptions;

use tenantry_backend::db::postgres_user_repository::PostgresUserRepository;
use tenantry_backend::db::user_repository::UserRepository;
use tenantry_backend::models::user::{normalize_email, NewUser, UserMutation};
use tenantry_backend::utils::password::{hash_password, password_problem};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let database_url =
        env::var("DATABASE_URL").context("DATABASE_URL is required to create a superadmin")?;
    let email = normalize_email(
        &env::var("SUPERADMIN_EMAIL").context("SUPERADMIN_EMAIL must be set")?,
    );
    let password = env::var("SUPERADMIN_PASSWORD").context("SUPERADMIN_PASSWORD must be set")?;

    if !email.contains('@') {
        bail!("SUPERADMIN_EMAIL is not a valid email address");
    }
    if let Some(problem) = password_problem(&password) {
        bail!("SUPERADMIN_PASSWORD rejected: {problem}");
    }
    let password_hash = hash_password(&password)
        .map_err(|err| anyhow::anyhow!("failed to hash password: {err}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .context("failed to connect to DATABASE_URL")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let repo = PostgresUserRepository { pool };
    let outcome = repo
        .create_user(&NewUser {
            email: email.clone(),
            username: None,
            name: Some("Super Admin".to_string()),
            password_hash,
            is_superadmin: true,
        })
        .await
        .context("failed to create superadmin")?;

    match outcome {
        UserMutation::Applied(user) => {
            println!("Created superadmin {} ({})", user.email, user.id);
            Ok(())
        }
        UserMutation::SecondSuperadmin => {
            bail!("a superadmin already exists; promote users from the admin API instead")
        }
        UserMutation::Conflict(conflict) => bail!("{}", conflict.message()),
        UserMutation::LastSuperadmin | UserMutation::NotFound => {
            bail!("unexpected outcome creating superadmin {email}")
        }
    }
}
