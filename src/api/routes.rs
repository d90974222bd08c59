use crate::api::{account, classes, progress};
use crate::config::Config;
use crate::db::Database;
use crate::streak::UserLocks;
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
    pub streak_locks: Arc<UserLocks>,
}

impl ApiState {
    pub fn database(&self) -> ApiResult<Database> {
        Ok(Database::open(&self.config.db_path)?)
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/auth/signup", post(account::signup))
        .route("/api/auth/login", post(account::login))
        .route("/api/user/me", get(account::me).put(account::update_me))
        .route("/api/games", get(progress::games))
        .route("/api/games/play", post(progress::play_game))
        .route(
            "/api/activities",
            get(progress::activities).post(progress::log_activity),
        )
        .route(
            "/api/streak",
            get(progress::streak_get).post(progress::streak_refresh),
        )
        .route(
            "/api/badges",
            get(progress::badges).post(progress::award_badge),
        )
        .route(
            "/api/friends",
            get(progress::friends).post(progress::add_friend),
        )
        .route("/api/friends/:id", delete(progress::remove_friend))
        .route("/api/goals", get(progress::goals).post(progress::add_goal))
        .route(
            "/api/goals/:id",
            put(progress::update_goal).delete(progress::delete_goal),
        )
        .route("/api/leaderboard", get(progress::leaderboard))
        .route("/api/community", get(progress::community))
        .route("/api/classes", get(classes::list).post(classes::create))
        .route("/api/classes/join", post(classes::join))
        .route(
            "/api/classes/:id",
            get(classes::detail).delete(classes::delete_class),
        )
        .route(
            "/api/classes/:id/members/:user_id",
            delete(classes::remove_member),
        )
        .with_state(state)
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message),
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::Internal(error) => {
                error!(error = %format!("{error:#}"), "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Trim `value` and reject it when empty or longer than `max` characters.
pub fn required_text(field: &str, value: &str, max: usize) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("{field} is required")));
    }
    if trimmed.chars().count() > max {
        return Err(ApiError::BadRequest(format!(
            "{field} must be at most {max} characters"
        )));
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{ApiState, router};
    use crate::config::Config;
    use crate::streak::UserLocks;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    pub struct TestApp {
        pub router: Router,
        pub config: Arc<Config>,
        _dir: TempDir,
    }

    impl TestApp {
        pub fn new() -> Self {
            let dir = tempfile::tempdir().expect("tempdir");
            let config = Arc::new(Config {
                db_path: dir.path().join("api.db"),
                jwt_secret: Some("router-test-secret".to_string()),
                ..Config::default()
            });
            let state = ApiState {
                config: Arc::clone(&config),
                streak_locks: Arc::new(UserLocks::default()),
            };

            Self {
                router: router(state),
                config,
                _dir: dir,
            }
        }

        pub async fn call(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                request = request.header("Authorization", format!("Bearer {token}"));
            }
            let body = match body {
                Some(value) => {
                    request = request.header("Content-Type", "application/json");
                    Body::from(value.to_string())
                }
                None => Body::empty(),
            };

            let response = self
                .router
                .clone()
                .oneshot(request.body(body).expect("request"))
                .await
                .expect("response");
            let status = response.status();
            let bytes = response
                .into_body()
                .collect()
                .await
                .expect("body")
                .to_bytes();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).expect("json body")
            };

            (status, value)
        }

        /// Sign up and log in, returning the session token.
        pub async fn register(&self, username: &str, role: &str) -> String {
            let (status, _) = self
                .call(
                    Method::POST,
                    "/api/auth/signup",
                    None,
                    Some(json!({
                        "username": username,
                        "email": format!("{username}@example.com"),
                        "birthDay": 14,
                        "birthMonth": 5,
                        "birthYear": 2013,
                        "password": "correct horse",
                        "role": role,
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);

            let (status, body) = self
                .call(
                    Method::POST,
                    "/api/auth/login",
                    None,
                    Some(json!({ "username": username, "password": "correct horse" })),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            body["token"].as_str().expect("token").to_string()
        }
    }
}
