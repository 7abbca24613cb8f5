//! Registration and login. Both are public.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use schoolhouse_core::Error;
use schoolhouse_core::models::NewUser;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::AppState;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::middleware::cached;

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/register", cached(post(register), state))
        .route("/auth/login", cached(post(login), state))
}

#[derive(Debug, Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

async fn register(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewUser>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let user = state.db.create_user(&input).await?;
    tracing::info!(user = %user.id, role = %user.role, "user registered");
    Ok((StatusCode::CREATED, Json(json!({ "message": "User registered successfully!", "user": user }))))
}

async fn login(
    State(state): State<AppState>,
    ApiJson(credentials): ApiJson<Credentials>,
) -> Result<Json<Value>, ApiError> {
    let user = state
        .db
        .authenticate(&credentials.username, &credentials.password)
        .await?
        .ok_or_else(|| Error::Unauthorized("invalid username or password".into()))?;

    let token = state.db.create_session(&user.id, state.session_ttl).await?;
    tracing::info!(user = %user.id, "login succeeded");
    Ok(Json(json!({ "message": "Login successful", "token": token, "user": user })))
}
