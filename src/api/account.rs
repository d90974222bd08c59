use crate::api::extract::AuthUser;
use crate::api::progress::{ActivityView, activity_view};
use crate::api::routes::{ApiError, ApiResult, ApiState, required_text};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::token::{self, Claims};
use crate::auth::Role;
use crate::db::{GameRow, GoalRow, NewUser, ProfileUpdate, UserRow, is_constraint_violation};
use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

const MIN_PASSWORD_CHARS: usize = 6;
const PROFILE_ACTIVITY_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupPayload {
    username: String,
    email: String,
    birth_day: u32,
    birth_month: u32,
    birth_year: i32,
    password: String,
    role: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    message: &'static str,
    user: UserRow,
}

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdatePayload {
    location: Option<String>,
    bio: Option<String>,
    education: Option<String>,
    favorite_game: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfilePayload {
    username: String,
    email: String,
    role: Role,
    streak: i64,
    join_date: String,
    location: Option<String>,
    bio: Option<String>,
    education: Option<String>,
    favorite_game: Option<String>,
    friend_count: usize,
    games: Vec<GameRow>,
    badges: Vec<String>,
    activities: Vec<ActivityView>,
    friends: Vec<String>,
    goals: Vec<GoalRow>,
}

pub async fn signup(
    State(state): State<ApiState>,
    Json(payload): Json<SignupPayload>,
) -> ApiResult<(StatusCode, Json<SignupResponse>)> {
    let username = required_text("username", &payload.username, 50)?;
    let email = required_text("email", &payload.email, 100)?;
    if !email.contains('@') {
        return Err(ApiError::BadRequest("email is invalid".to_string()));
    }
    if payload.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }
    NaiveDate::from_ymd_opt(payload.birth_year, payload.birth_month, payload.birth_day)
        .ok_or_else(|| ApiError::BadRequest("birth date is invalid".to_string()))?;
    let role = payload
        .role
        .as_deref()
        .map(Role::parse)
        .transpose()
        .map_err(|error| ApiError::BadRequest(error.to_string()))?
        .unwrap_or_default();

    let new_user = NewUser {
        username,
        email,
        birth_day: payload.birth_day,
        birth_month: payload.birth_month,
        birth_year: payload.birth_year,
        password_hash: hash_password(&payload.password)?,
        role,
        join_date: Local::now().date_naive().format("%Y-%m-%d").to_string(),
    };

    let database = state.database()?;
    let user = database.create_user(&new_user).map_err(|error| {
        if is_constraint_violation(&error) {
            ApiError::Conflict("Username or email already in use".to_string())
        } else {
            ApiError::Internal(error)
        }
    })?;

    info!(user_id = user.id, role = %user.role, "user signed up");

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "User created",
            user,
        }),
    ))
}

pub async fn login(
    State(state): State<ApiState>,
    Json(payload): Json<LoginPayload>,
) -> ApiResult<Json<LoginResponse>> {
    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());

    let database = state.database()?;
    let credentials = database
        .credentials(payload.username.trim())?
        .ok_or_else(invalid)?;
    if !verify_password(&payload.password, &credentials.password_hash)? {
        return Err(invalid());
    }

    let claims = Claims::new(
        credentials.user_id,
        &credentials.username,
        credentials.role,
        Utc::now().timestamp(),
        state.config.token_ttl_minutes,
    );
    let token = token::issue(state.config.jwt_secret()?, &claims)
        .context("Failed to issue session token")?;

    info!(user_id = credentials.user_id, "user logged in");

    Ok(Json(LoginResponse { token }))
}

pub async fn me(State(state): State<ApiState>, user: AuthUser) -> ApiResult<Json<ProfilePayload>> {
    let database = state.database()?;
    let profile = database
        .user_by_id(user.user_id)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let friends = database
        .friends_for_user(user.user_id)?
        .into_iter()
        .map(|friend| friend.friend_name)
        .collect::<Vec<_>>();
    let activities = database
        .recent_activities(user.user_id, PROFILE_ACTIVITY_LIMIT)?
        .into_iter()
        .map(activity_view)
        .collect::<Vec<_>>();

    Ok(Json(ProfilePayload {
        username: profile.username,
        email: profile.email,
        role: profile.role,
        streak: profile.streak,
        join_date: profile.join_date,
        location: profile.location,
        bio: profile.bio,
        education: profile.education,
        favorite_game: profile.favorite_game,
        friend_count: friends.len(),
        games: database.games_for_user(user.user_id)?,
        badges: database.badges_for_user(user.user_id)?,
        activities,
        friends,
        goals: database.goals_for_user(user.user_id)?,
    }))
}

pub async fn update_me(
    State(state): State<ApiState>,
    user: AuthUser,
    Json(payload): Json<ProfileUpdatePayload>,
) -> ApiResult<Json<UserRow>> {
    let update = ProfileUpdate {
        location: optional_text("location", payload.location, 100)?,
        bio: optional_text("bio", payload.bio, 1_000)?,
        education: optional_text("education", payload.education, 100)?,
        favorite_game: optional_text("favorite_game", payload.favorite_game, 50)?,
    };

    let database = state.database()?;
    let updated = database
        .update_profile(user.user_id, &update)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(updated))
}

fn optional_text(field: &str, value: Option<String>, max: usize) -> ApiResult<Option<String>> {
    value
        .map(|value| {
            if value.chars().count() > max {
                return Err(ApiError::BadRequest(format!(
                    "{field} must be at most {max} characters"
                )));
            }
            Ok(value.trim().to_string())
        })
        .transpose()
}
