//! Daily attendance records.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use schoolhouse_core::models::{Attendance, NewAttendance};
use serde::Deserialize;
use serde_json::{Value, json};

use super::found;
use crate::AppState;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::middleware::{ANY, CurrentUser, STAFF_FACULTY, guarded};

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/attendance", guarded(post(record), STAFF_FACULTY, state))
        .route("/attendance/range", guarded(get(in_range), STAFF_FACULTY, state))
        .route("/attendance/student/{student_id}", guarded(get(for_student), ANY, state))
        .route(
            "/attendance/{id}",
            guarded(get(get_record), ANY, state)
                .merge(guarded(put(update_record), STAFF_FACULTY, state))
                .merge(guarded(delete(delete_record), STAFF_FACULTY, state)),
        )
}

#[derive(Debug, Deserialize)]
struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

async fn record(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(input): ApiJson<NewAttendance>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let attendance = state.db.create_attendance(&input, &user.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Attendance recorded successfully!", "attendance": attendance })),
    ))
}

async fn get_record(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Attendance>, ApiError> {
    Ok(Json(found(state.db.get_attendance(&id).await?, "attendance record", &id)?))
}

async fn update_record(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<NewAttendance>,
) -> Result<Json<Value>, ApiError> {
    let attendance = state.db.update_attendance(&id, &input, &user.id).await?;
    Ok(Json(json!({ "message": "Attendance updated successfully!", "attendance": attendance })))
}

async fn delete_record(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    state.db.delete_attendance(&id).await?;
    Ok(Json(json!({ "message": "Attendance deleted successfully!" })))
}

async fn for_student(State(state): State<AppState>, Path(student_id): Path<String>) -> Result<Json<Value>, ApiError> {
    found(state.db.get_student(&student_id).await?, "student", &student_id)?;
    let records = state.db.attendance_for_student(&student_id).await?;
    Ok(Json(json!({ "count": records.len(), "attendance": records })))
}

async fn in_range(
    State(state): State<AppState>,
    ApiQuery(range): ApiQuery<DateRange>,
) -> Result<Json<Value>, ApiError> {
    let records = state.db.attendance_in_range(range.start, range.end).await?;
    Ok(Json(json!({
        "count": records.len(),
        "attendance": records,
        "date_range": { "start": range.start, "end": range.end },
    })))
}
