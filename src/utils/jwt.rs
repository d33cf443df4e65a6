//! Signed `auth_token` cookies. A token only names a session row; whether the
//! session is still live is decided by the row, not by the token.

use std::collections::HashSet;

use jsonwebtoken::{decode, encode, errors::Error, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::routes::auth::claims::Claims;

pub const MIN_SECRET_BYTES: usize = 32;
const MIN_DISTINCT_SECRET_BYTES: usize = 8;

#[derive(Debug, Error)]
pub enum JwtSecretError {
    #[error("JWT_SECRET must be set")]
    Missing,
    #[error("JWT_SECRET is {0} bytes; at least {MIN_SECRET_BYTES} are required")]
    TooShort(usize),
    #[error("JWT_SECRET uses only {0} distinct bytes; at least {MIN_DISTINCT_SECRET_BYTES} are required")]
    Repetitive(usize),
}

/// Issues and verifies session JWTs for one issuer/audience pair.
#[derive(Clone)]
pub struct SessionTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl SessionTokens {
    pub fn from_env(issuer: &str, audience: &str) -> Result<Self, JwtSecretError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| JwtSecretError::Missing)?;
        Self::new(secret.as_bytes(), issuer, audience)
    }

    pub fn new(secret: &[u8], issuer: &str, audience: &str) -> Result<Self, JwtSecretError> {
        if secret.len() < MIN_SECRET_BYTES {
            return Err(JwtSecretError::TooShort(secret.len()));
        }
        let distinct = secret.iter().collect::<HashSet<_>>().len();
        if distinct < MIN_DISTINCT_SECRET_BYTES {
            return Err(JwtSecretError::Repetitive(distinct));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.to_owned(),
            audience: audience.to_owned(),
        })
    }

    pub fn issue(
        &self,
        user_id: Uuid,
        session_token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<String, Error> {
        let claims = Claims {
            sub: user_id,
            sid: session_token.to_owned(),
            exp: expires_at.unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        decode::<Claims>(token, &self.decoding, &validation).map(|data| data.claims)
    }
}
