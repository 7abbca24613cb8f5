//! Account administration, staff only.

use axum::extract::{Path, State};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use schoolhouse_core::models::{User, UserUpdate};
use serde_json::{Value, json};

use super::found;
use crate::AppState;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::middleware::{STAFF, guarded};

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new().route("/users", guarded(get(list_users), STAFF, state)).route(
        "/users/{id}",
        guarded(get(get_user), STAFF, state)
            .merge(guarded(put(update_user), STAFF, state))
            .merge(guarded(delete(delete_user), STAFF, state)),
    )
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let users = state.db.list_users().await?;
    Ok(Json(json!({ "count": users.len(), "users": users })))
}

async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<User>, ApiError> {
    Ok(Json(found(state.db.get_user(&id).await?, "user", &id)?))
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<UserUpdate>,
) -> Result<Json<Value>, ApiError> {
    let user = state.db.update_user(&id, &input).await?;
    tracing::info!(user = %user.id, role = %user.role, "user updated");
    Ok(Json(json!({ "message": "User updated successfully!", "user": user })))
}

async fn delete_user(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    state.db.delete_user(&id).await?;
    tracing::info!(user = %id, "user deleted");
    Ok(Json(json!({ "message": "User deleted successfully!" })))
}
