use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_superadmin: bool,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_login_at: Option<OffsetDateTime>,
    pub last_login_ip: Option<String>,
    pub current_login_ip: Option<String>,
    pub login_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Input for inserting a user. `password_hash` must already be hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: Option<String>,
    pub name: Option<String>,
    pub password_hash: String,
    pub is_superadmin: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub active: Option<bool>,
    pub is_superadmin: Option<bool>,
}

/// Outcome of a user write. The non-`Applied` variants left the store untouched.
#[derive(Debug)]
pub enum UserMutation<T> {
    Applied(T),
    Conflict(UserConflict),
    SecondSuperadmin,
    LastSuperadmin,
    NotFound,
}

pub const SECOND_SUPERADMIN_MESSAGE: &str =
    "Only one super admin is allowed. Use CLI command to create additional super admins if needed.";
pub const LAST_SUPERADMIN_MESSAGE: &str =
    "Cannot remove the last super admin. Create another super admin first.";

/// Which unique column rejected a user insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserConflict {
    Email,
    Username,
}

impl UserConflict {
    pub fn message(&self) -> &'static str {
        match self {
            UserConflict::Email => "A user with this email already exists",
            UserConflict::Username => "This username is already taken",
        }
    }
}

/// Normalizes an email for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
