use crate::api::extract::AuthUser;
use crate::api::routes::{ApiError, ApiResult, ApiState, required_text};
use crate::db::{ActivityRow, FriendRow, GameRow, GoalRow, LeaderboardRow};
use crate::streak::service::refresh_stored_streak;
use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const DEFAULT_ACTIVITY_LIMIT: usize = 50;
const MAX_ACTIVITY_LIMIT: usize = 500;
const MAX_LEADERBOARD_LIMIT: usize = 100;

#[derive(Debug, Serialize)]
pub struct ActivityView {
    id: i64,
    text: String,
    timestamp: String,
}

pub fn activity_view(row: ActivityRow) -> ActivityView {
    let timestamp = Local
        .timestamp_opt(row.recorded_at, 0)
        .single()
        .map(|datetime| datetime.to_rfc3339())
        .unwrap_or_else(|| row.recorded_at.to_string());

    ActivityView {
        id: row.id,
        text: row.text,
        timestamp,
    }
}

#[derive(Debug, Deserialize)]
pub struct PlayPayload {
    game_name: String,
    score: i64,
    level: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PlayResponse {
    game: GameRow,
    activity: String,
}

#[derive(Debug, Deserialize)]
pub struct ActivitiesQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityPayload {
    text: String,
    timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StreakPayload {
    streak: i64,
}

#[derive(Debug, Deserialize)]
pub struct BadgePayload {
    badge_name: String,
}

#[derive(Debug, Deserialize)]
pub struct FriendPayload {
    friend_name: String,
}

#[derive(Debug, Deserialize)]
pub struct GoalPayload {
    text: String,
}

#[derive(Debug, Deserialize)]
pub struct GoalUpdatePayload {
    completed: bool,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    limit: Option<usize>,
}

pub async fn games(State(state): State<ApiState>, user: AuthUser) -> ApiResult<Json<Vec<GameRow>>> {
    let database = state.database()?;
    Ok(Json(database.games_for_user(user.user_id)?))
}

/// Record a finished game round. Also logs a completion activity, which is
/// what the streak refresh looks for.
pub async fn play_game(
    State(state): State<ApiState>,
    user: AuthUser,
    Json(payload): Json<PlayPayload>,
) -> ApiResult<Json<PlayResponse>> {
    let game_name = required_text("game_name", &payload.game_name, 50)?;
    if payload.score < 0 {
        return Err(ApiError::BadRequest("score must not be negative".to_string()));
    }
    let level = payload.level.unwrap_or(1);
    if level < 1 {
        return Err(ApiError::BadRequest("level must be at least 1".to_string()));
    }

    let activity = format!(
        "{} {game_name} (score {})",
        state.config.completion_marker, payload.score
    );
    let mut database = state.database()?;
    let game = database.record_game_play(
        user.user_id,
        &game_name,
        payload.score,
        level,
        &activity,
        Local::now().timestamp(),
    )?;

    Ok(Json(PlayResponse { game, activity }))
}

pub async fn activities(
    State(state): State<ApiState>,
    user: AuthUser,
    Query(query): Query<ActivitiesQuery>,
) -> ApiResult<Json<Vec<ActivityView>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .clamp(1, MAX_ACTIVITY_LIMIT);
    let database = state.database()?;
    let rows = database.recent_activities(user.user_id, limit)?;

    Ok(Json(rows.into_iter().map(activity_view).collect()))
}

pub async fn log_activity(
    State(state): State<ApiState>,
    user: AuthUser,
    Json(payload): Json<ActivityPayload>,
) -> ApiResult<(StatusCode, Json<ActivityView>)> {
    let text = required_text("text", &payload.text, 255)?;
    let recorded_at = match payload.timestamp.as_deref() {
        Some(raw) => DateTime::parse_from_rfc3339(raw.trim())
            .map_err(|_| {
                ApiError::BadRequest(format!(
                    "Invalid timestamp: {raw}. Example: 2026-02-18T09:30:00+01:00"
                ))
            })?
            .timestamp(),
        None => Local::now().timestamp(),
    };

    let database = state.database()?;
    let row = database.insert_activity(user.user_id, &text, recorded_at)?;

    Ok((StatusCode::CREATED, Json(activity_view(row))))
}

pub async fn streak_get(
    State(state): State<ApiState>,
    user: AuthUser,
) -> ApiResult<Json<StreakPayload>> {
    let database = state.database()?;
    let profile = database
        .user_by_id(user.user_id)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(StreakPayload {
        streak: profile.streak,
    }))
}

pub async fn streak_refresh(
    State(state): State<ApiState>,
    user: AuthUser,
) -> ApiResult<Json<StreakPayload>> {
    // The refresh blocks on a per-user mutex and on SQLite's write lock.
    let streak = tokio::task::spawn_blocking(move || {
        refresh_stored_streak(
            &state.config.db_path,
            &state.config.completion_marker,
            &state.streak_locks,
            user.user_id,
            &Local::now(),
        )
    })
    .await
    .context("Streak refresh task failed")?
    .map_err(|error| ApiError::Internal(error.into()))?;

    Ok(Json(StreakPayload {
        streak: i64::from(streak),
    }))
}

pub async fn badges(State(state): State<ApiState>, user: AuthUser) -> ApiResult<Json<Value>> {
    let database = state.database()?;
    Ok(Json(json!({ "badges": database.badges_for_user(user.user_id)? })))
}

pub async fn award_badge(
    State(state): State<ApiState>,
    user: AuthUser,
    Json(payload): Json<BadgePayload>,
) -> ApiResult<Json<Value>> {
    let badge_name = required_text("badge_name", &payload.badge_name, 50)?;
    let database = state.database()?;
    let awarded = database.award_badge(user.user_id, &badge_name)?;

    Ok(Json(json!({ "badge_name": badge_name, "awarded": awarded })))
}

pub async fn friends(
    State(state): State<ApiState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<FriendRow>>> {
    let database = state.database()?;
    Ok(Json(database.friends_for_user(user.user_id)?))
}

pub async fn add_friend(
    State(state): State<ApiState>,
    user: AuthUser,
    Json(payload): Json<FriendPayload>,
) -> ApiResult<(StatusCode, Json<FriendRow>)> {
    let friend_name = required_text("friend_name", &payload.friend_name, 50)?;
    let database = state.database()?;
    let friend = database.add_friend(user.user_id, &friend_name)?;

    Ok((StatusCode::CREATED, Json(friend)))
}

pub async fn remove_friend(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(friend_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let database = state.database()?;
    if !database.remove_friend(user.user_id, friend_id)? {
        return Err(ApiError::NotFound(format!("Friend not found: {friend_id}")));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn goals(State(state): State<ApiState>, user: AuthUser) -> ApiResult<Json<Vec<GoalRow>>> {
    let database = state.database()?;
    Ok(Json(database.goals_for_user(user.user_id)?))
}

pub async fn add_goal(
    State(state): State<ApiState>,
    user: AuthUser,
    Json(payload): Json<GoalPayload>,
) -> ApiResult<(StatusCode, Json<GoalRow>)> {
    let text = required_text("text", &payload.text, 255)?;
    let database = state.database()?;
    let goal = database.add_goal(user.user_id, &text)?;

    Ok((StatusCode::CREATED, Json(goal)))
}

pub async fn update_goal(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(goal_id): Path<i64>,
    Json(payload): Json<GoalUpdatePayload>,
) -> ApiResult<Json<GoalRow>> {
    let database = state.database()?;
    let goal = database
        .set_goal_completed(user.user_id, goal_id, payload.completed)?
        .ok_or_else(|| ApiError::NotFound(format!("Goal not found: {goal_id}")))?;

    Ok(Json(goal))
}

pub async fn delete_goal(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(goal_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let database = state.database()?;
    if !database.delete_goal(user.user_id, goal_id)? {
        return Err(ApiError::NotFound(format!("Goal not found: {goal_id}")));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn leaderboard(
    State(state): State<ApiState>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<Json<Vec<LeaderboardRow>>> {
    let limit = query
        .limit
        .unwrap_or(state.config.leaderboard_limit)
        .clamp(1, MAX_LEADERBOARD_LIMIT);
    let database = state.database()?;

    Ok(Json(database.leaderboard(limit)?))
}

pub async fn community(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "message": state.config.community_message,
        "support_email": state.config.support_email,
    }))
}
