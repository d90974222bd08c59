//! HS256 JSON Web Tokens for session auth.

use crate::auth::Role;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: i64, username: &str, role: Role, issued_at: i64, ttl_minutes: i64) -> Self {
        Self {
            sub: user_id,
            username: username.to_string(),
            role,
            iat: issued_at,
            exp: issued_at + ttl_minutes * 60,
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token algorithm is not supported")]
    UnsupportedAlgorithm,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token signing failed: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        match error.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::BadSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                Self::UnsupportedAlgorithm
            }
            _ => Self::Malformed,
        }
    }
}

pub fn issue(secret: &str, claims: &Claims) -> Result<String, TokenError> {
    let key = EncodingKey::from_secret(secret.as_bytes());

    jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &key)
        .map_err(|error| TokenError::Signing(error.to_string()))
}

/// Check signature and expiry. A token is expired from its `exp` second on.
pub fn verify(secret: &str, token: &str) -> Result<Claims, TokenError> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    let data = jsonwebtoken::decode::<Claims>(token, &key, &validation)?;
    Ok(data.claims)
}
