//! Assignments and the grades recorded against them.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use schoolhouse_core::models::{Assignment, Grade, NewAssignment, NewGrade};
use serde_json::{Value, json};

use super::found;
use crate::AppState;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::middleware::{ANY, CurrentUser, STAFF_FACULTY, guarded};

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/assignments",
            guarded(get(list_assignments), ANY, state).merge(guarded(post(create_assignment), STAFF_FACULTY, state)),
        )
        .route(
            "/assignments/{id}",
            guarded(get(get_assignment), ANY, state)
                .merge(guarded(put(update_assignment), STAFF_FACULTY, state))
                .merge(guarded(delete(delete_assignment), STAFF_FACULTY, state)),
        )
        .route("/grades", guarded(post(create_grade), STAFF_FACULTY, state))
        .route("/grades/student/{student_id}", guarded(get(grades_for_student), ANY, state))
        .route(
            "/grades/assignment/{assignment_id}",
            guarded(get(grades_for_assignment), STAFF_FACULTY, state),
        )
        .route(
            "/grades/{id}",
            guarded(get(get_grade), ANY, state).merge(guarded(put(update_grade), STAFF_FACULTY, state)),
        )
}

async fn list_assignments(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let assignments = state.db.list_assignments().await?;
    Ok(Json(json!({ "count": assignments.len(), "assignments": assignments })))
}

async fn get_assignment(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Assignment>, ApiError> {
    Ok(Json(found(state.db.get_assignment(&id).await?, "assignment", &id)?))
}

async fn create_assignment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(input): ApiJson<NewAssignment>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let assignment = state.db.create_assignment(&input, &user.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Assignment created successfully!", "assignment": assignment })),
    ))
}

async fn update_assignment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<NewAssignment>,
) -> Result<Json<Value>, ApiError> {
    let assignment = state.db.update_assignment(&id, &input).await?;
    Ok(Json(json!({ "message": "Assignment updated successfully!", "assignment": assignment })))
}

async fn delete_assignment(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    state.db.delete_assignment(&id).await?;
    Ok(Json(json!({ "message": "Assignment deleted successfully!" })))
}

async fn create_grade(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(input): ApiJson<NewGrade>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let grade = state.db.create_grade(&input, &user.id).await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": "Grade recorded successfully!", "grade": grade }))))
}

async fn get_grade(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Grade>, ApiError> {
    Ok(Json(found(state.db.get_grade(&id).await?, "grade", &id)?))
}

async fn update_grade(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<NewGrade>,
) -> Result<Json<Value>, ApiError> {
    let grade = state.db.update_grade(&id, &input, &user.id).await?;
    Ok(Json(json!({ "message": "Grade updated successfully!", "grade": grade })))
}

async fn grades_for_student(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    found(state.db.get_student(&student_id).await?, "student", &student_id)?;
    let grades = state.db.grades_for_student(&student_id).await?;
    Ok(Json(json!({ "count": grades.len(), "grades": grades })))
}

async fn grades_for_assignment(
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    found(state.db.get_assignment(&assignment_id).await?, "assignment", &assignment_id)?;
    let grades = state.db.grades_for_assignment(&assignment_id).await?;
    Ok(Json(json!({ "count": grades.len(), "grades": grades })))
}
