use crate::api::extract::AuthUser;
use crate::api::routes::{ApiError, ApiResult, ApiState, required_text};
use crate::auth::Role;
use crate::db::{ClassMemberRow, ClassRow, Database};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct CreateClassPayload {
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinClassPayload {
    code: String,
}

#[derive(Debug, Serialize)]
pub struct ClassListPayload {
    classes: Vec<ClassRow>,
}

#[derive(Debug, Serialize)]
pub struct ClassDetailPayload {
    class: ClassRow,
    members: Vec<ClassMemberRow>,
}

#[derive(Debug, Serialize)]
pub struct JoinClassResponse {
    class: ClassRow,
    joined: bool,
}

pub async fn create(
    State(state): State<ApiState>,
    user: AuthUser,
    Json(payload): Json<CreateClassPayload>,
) -> ApiResult<(StatusCode, Json<ClassRow>)> {
    user.require_teacher()?;
    let name = required_text("name", &payload.name, 100)?;

    let database = state.database()?;
    let class = database.create_class(user.user_id, &name, Utc::now().timestamp())?;

    info!(class_id = class.id, owner_id = user.user_id, "class created");

    Ok((StatusCode::CREATED, Json(class)))
}

pub async fn list(
    State(state): State<ApiState>,
    user: AuthUser,
) -> ApiResult<Json<ClassListPayload>> {
    let database = state.database()?;
    // Teachers can also join other teachers' classes by code.
    let mut classes = match user.role {
        Role::Teacher => database.classes_owned_by(user.user_id)?,
        Role::Student => Vec::new(),
    };
    classes.extend(database.classes_joined_by(user.user_id)?);

    Ok(Json(ClassListPayload { classes }))
}

pub async fn join(
    State(state): State<ApiState>,
    user: AuthUser,
    Json(payload): Json<JoinClassPayload>,
) -> ApiResult<Json<JoinClassResponse>> {
    let code = required_text("code", &payload.code, 16)?;

    let database = state.database()?;
    let class = database
        .class_by_code(&code)?
        .ok_or_else(|| ApiError::NotFound("No class with that code".to_string()))?;
    if class.owner_id == user.user_id {
        return Err(ApiError::BadRequest(
            "You cannot join your own class".to_string(),
        ));
    }

    let joined = database.join_class(class.id, user.user_id, Utc::now().timestamp())?;
    if joined {
        info!(class_id = class.id, user_id = user.user_id, "class joined");
    }

    // Re-read so member_count includes this user.
    let class = database.class_by_id(class.id)?.unwrap_or(class);

    Ok(Json(JoinClassResponse { class, joined }))
}

pub async fn detail(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(class_id): Path<i64>,
) -> ApiResult<Json<ClassDetailPayload>> {
    user.require_teacher()?;
    let database = state.database()?;
    let class = owned_class(&database, class_id, &user)?;
    let members = database.class_members(class.id)?;

    Ok(Json(ClassDetailPayload { class, members }))
}

pub async fn remove_member(
    State(state): State<ApiState>,
    user: AuthUser,
    Path((class_id, member_id)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    user.require_teacher()?;
    let database = state.database()?;
    let class = owned_class(&database, class_id, &user)?;

    if !database.remove_class_member(class.id, member_id)? {
        return Err(ApiError::NotFound(format!(
            "User {member_id} is not in class {class_id}"
        )));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_class(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(class_id): Path<i64>,
) -> ApiResult<StatusCode> {
    user.require_teacher()?;
    let database = state.database()?;
    let class = owned_class(&database, class_id, &user)?;
    database.delete_class(class.id)?;

    info!(class_id, owner_id = user.user_id, "class deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Classes owned by someone else look the same as missing ones.
fn owned_class(database: &Database, class_id: i64, user: &AuthUser) -> ApiResult<ClassRow> {
    database
        .class_by_id(class_id)?
        .filter(|class| class.owner_id == user.user_id)
        .ok_or_else(|| ApiError::NotFound(format!("Class not found: {class_id}")))
}

#[cfg(test)]
mod tests {
    use crate::api::routes::test_support::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn students_cannot_create_classes() {
        let app = TestApp::new();
        let student = app.register("mila", "student").await;

        let (status, _) = app
            .call(
                Method::POST,
                "/api/classes",
                Some(&student),
                Some(json!({ "name": "Groep 7" })),
            )
            .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn teacher_sees_joined_students_with_streaks() {
        let app = TestApp::new();
        let teacher = app.register("mr-jansen", "teacher").await;
        let student = app.register("mila", "student").await;

        let (status, class) = app
            .call(
                Method::POST,
                "/api/classes",
                Some(&teacher),
                Some(json!({ "name": "Groep 7" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, joined) = app
            .call(
                Method::POST,
                "/api/classes/join",
                Some(&student),
                Some(json!({ "code": class["join_code"] })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(joined["joined"], true);
        assert_eq!(joined["class"]["member_count"], 1);

        app.call(
            Method::POST,
            "/api/games/play",
            Some(&student),
            Some(json!({ "game_name": "Tafels", "score": 8 })),
        )
        .await;
        app.call(Method::POST, "/api/streak", Some(&student), None).await;

        let uri = format!("/api/classes/{}", class["id"]);
        let (status, detail) = app.call(Method::GET, &uri, Some(&teacher), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["members"][0]["username"], "mila");
        assert_eq!(detail["members"][0]["streak"], 1);
        assert_eq!(detail["members"][0]["total_score"], 8);

        let (status, _) = app.call(Method::GET, &uri, Some(&student), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn other_teachers_cannot_see_a_class() {
        let app = TestApp::new();
        let owner = app.register("mr-jansen", "teacher").await;
        let other = app.register("ms-bakker", "teacher").await;

        let (_, class) = app
            .call(
                Method::POST,
                "/api/classes",
                Some(&owner),
                Some(json!({ "name": "Groep 8" })),
            )
            .await;
        let uri = format!("/api/classes/{}", class["id"]);

        let (status, _) = app.call(Method::DELETE, &uri, Some(&other), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app.call(Method::DELETE, &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, listed) = app.call(Method::GET, "/api/classes", Some(&owner), None).await;
        assert_eq!(listed["classes"], json!([]));
    }

    #[tokio::test]
    async fn teachers_list_owned_and_joined_classes() {
        let app = TestApp::new();
        let owner = app.register("mr-jansen", "teacher").await;
        let guest = app.register("ms-bakker", "teacher").await;

        let (_, hosted) = app
            .call(
                Method::POST,
                "/api/classes",
                Some(&owner),
                Some(json!({ "name": "Groep 7" })),
            )
            .await;
        let (_, own) = app
            .call(
                Method::POST,
                "/api/classes",
                Some(&guest),
                Some(json!({ "name": "Groep 8" })),
            )
            .await;
        let (status, _) = app
            .call(
                Method::POST,
                "/api/classes/join",
                Some(&guest),
                Some(json!({ "code": hosted["join_code"] })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, listed) = app.call(Method::GET, "/api/classes", Some(&guest), None).await;
        assert_eq!(status, StatusCode::OK);
        let ids = listed["classes"]
            .as_array()
            .expect("classes")
            .iter()
            .map(|class| class["id"].clone())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![own["id"].clone(), hosted["id"].clone()]);
    }
}
