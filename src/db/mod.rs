pub mod activity_repository;
pub mod api_key_repository;
pub mod billing_event_repository;
#[cfg(test)]
pub mod mock_db;
pub mod postgres_activity_repository;
pub mod postgres_api_key_repository;
pub mod postgres_billing_event_repository;
pub mod postgres_session_repository;
pub mod postgres_user_repository;
pub mod postgres_workspace_repository;
pub mod scope;
pub mod session_repository;
pub mod user_repository;
pub mod workspace_repository;

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code == "23505";
        }
    }
    false
}

/// Name of the violated constraint when `err` is a unique violation.
pub(crate) fn unique_violation_constraint(err: &sqlx::Error) -> Option<String> {
    if !is_unique_violation(err) {
        return None;
    }
    match err {
        sqlx::Error::Database(db_err) => Some(db_err.constraint().unwrap_or_default().to_string()),
        _ => None,
    }
}
