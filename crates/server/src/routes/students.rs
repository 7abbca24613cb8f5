use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use schoolhouse_core::models::{NewStudent, Student};
use serde_json::{Value, json};

use super::found;
use crate::AppState;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::middleware::{ANY, STAFF_FACULTY, guarded};

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/students",
            guarded(get(list_students), ANY, state).merge(guarded(post(create_student), STAFF_FACULTY, state)),
        )
        .route(
            "/students/{id}",
            guarded(get(get_student), ANY, state)
                .merge(guarded(put(update_student), STAFF_FACULTY, state))
                .merge(guarded(delete(delete_student), STAFF_FACULTY, state)),
        )
}

async fn list_students(State(state): State<AppState>) -> Result<Json<Vec<Student>>, ApiError> {
    Ok(Json(state.db.list_students().await?))
}

async fn get_student(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Student>, ApiError> {
    let student = found(state.db.get_student(&id).await?, "student", &id)?;
    Ok(Json(student))
}

async fn create_student(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewStudent>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let student = state.db.create_student(&input).await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": "Student created successfully!", "student": student }))))
}

async fn update_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<NewStudent>,
) -> Result<Json<Value>, ApiError> {
    let student = state.db.update_student(&id, &input).await?;
    Ok(Json(json!({ "message": "Student updated successfully!", "student": student })))
}

async fn delete_student(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    state.db.delete_student(&id).await?;
    Ok(Json(json!({ "message": "Student deleted successfully!" })))
}
