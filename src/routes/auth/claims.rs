use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Claims {
    pub sub: Uuid,
    /// Token of the `user_sessions` row backing this JWT.
    pub sid: String,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}
