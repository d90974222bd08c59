use crate::api::routes::{ApiError, ApiResult, ApiState};
use crate::auth::Role;
use crate::auth::token;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use tracing::debug;

/// Caller identity taken from a verified bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
}

impl AuthUser {
    pub fn require_teacher(&self) -> ApiResult<()> {
        match self.role {
            Role::Teacher => Ok(()),
            Role::Student => Err(ApiError::Forbidden(
                "Only teachers can manage classes".to_string(),
            )),
        }
    }
}

#[async_trait]
impl FromRequestParts<ApiState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("Access denied".to_string()))?;
        let secret = state.config.jwt_secret()?;

        let claims = token::verify(secret, token).map_err(|error| {
            debug!(error = %error, "rejected bearer token");
            ApiError::Forbidden("Invalid token".to_string())
        })?;

        Ok(Self {
            user_id: claims.sub,
            username: claims.username,
            role: claims.role,
        })
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get("Authorization")?.to_str().ok()?.trim();
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}
