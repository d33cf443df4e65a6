use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub const API_KEY_PREFIX: &str = "rk_";
const SECRET_BYTES: usize = 24;
const DISPLAY_PREFIX_LEN: usize = 7;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApiKey {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub prefix: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_used_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct CreateApiKey {
    pub name: String,
}

/// Response when creating an API key (includes full key, shown only once)
#[derive(Debug, Serialize)]
pub struct ApiKeyCreated {
    pub id: Uuid,
    pub name: String,
    pub key: String,
    pub prefix: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Freshly generated key material. Only `prefix` and `hash` are persisted.
pub struct GeneratedApiKey {
    pub full_key: String,
    pub prefix: String,
    pub hash: String,
}

pub fn generate_api_key() -> GeneratedApiKey {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rng().fill(&mut bytes);
    let full_key = format!("{API_KEY_PREFIX}{}", hex::encode(bytes));
    let prefix = full_key[..DISPLAY_PREFIX_LEN].to_string();
    let hash = hash_api_key(&full_key);
    GeneratedApiKey {
        full_key,
        prefix,
        hash,
    }
}

pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

pub fn looks_like_api_key(token: &str) -> bool {
    token.starts_with(API_KEY_PREFIX)
        && token.len() == API_KEY_PREFIX.len() + SECRET_BYTES * 2
        && token[API_KEY_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit())
}
