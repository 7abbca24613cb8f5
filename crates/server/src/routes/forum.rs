//! Forum posts and comments.
//!
//! Any role may read and write; edits are restricted to the author, and
//! faculty and staff may additionally remove posts.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use schoolhouse_core::Error;
use schoolhouse_core::models::{ForumPost, NewComment, NewPost, Role, User};
use serde_json::{Value, json};

use super::found;
use crate::AppState;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::middleware::{ANY, CurrentUser, guarded};

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/forum/posts", guarded(post(create_post), ANY, state))
        .route("/forum/posts/student/{student_id}", guarded(get(posts_for_student), ANY, state))
        .route(
            "/forum/posts/{id}",
            guarded(get(get_post), ANY, state)
                .merge(guarded(put(update_post), ANY, state))
                .merge(guarded(delete(delete_post), ANY, state)),
        )
        .route(
            "/forum/posts/{id}/comments",
            guarded(get(list_comments), ANY, state).merge(guarded(post(create_comment), ANY, state)),
        )
        .route("/forum/comments/{id}", guarded(put(update_comment), ANY, state))
}

fn ensure_author(user: &User, author_id: &str, action: &str) -> Result<(), Error> {
    if user.id == author_id {
        Ok(())
    } else {
        Err(Error::Forbidden(format!("only the author may {action}")))
    }
}

fn ensure_can_delete(user: &User, author_id: &str) -> Result<(), Error> {
    match user.role {
        Role::Faculty | Role::Staff => Ok(()),
        Role::Parent => ensure_author(user, author_id, "delete this post"),
    }
}

async fn create_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(input): ApiJson<NewPost>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let post = state.db.create_post(&input, &user.id).await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": "Post created successfully!", "post": post }))))
}

async fn get_post(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<ForumPost>, ApiError> {
    Ok(Json(found(state.db.get_post(&id).await?, "post", &id)?))
}

async fn update_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<NewPost>,
) -> Result<Json<Value>, ApiError> {
    let existing = found(state.db.get_post(&id).await?, "post", &id)?;
    ensure_author(&user, &existing.author_id, "edit this post")?;
    let post = state.db.update_post(&id, &input).await?;
    Ok(Json(json!({ "message": "Post updated successfully!", "post": post })))
}

async fn delete_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let existing = found(state.db.get_post(&id).await?, "post", &id)?;
    ensure_can_delete(&user, &existing.author_id)?;
    state.db.delete_post(&id).await?;
    Ok(Json(json!({ "message": "Post deleted successfully!" })))
}

async fn posts_for_student(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    found(state.db.get_student(&student_id).await?, "student", &student_id)?;
    let posts = state.db.posts_for_student(&student_id).await?;
    Ok(Json(json!({ "count": posts.len(), "posts": posts })))
}

async fn list_comments(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let comments = state.db.comments_for_post(&id).await?;
    Ok(Json(json!({ "count": comments.len(), "comments": comments })))
}

async fn create_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<NewComment>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let comment = state.db.create_comment(&id, &input, &user.id).await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": "Comment added successfully!", "comment": comment }))))
}

async fn update_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<NewComment>,
) -> Result<Json<Value>, ApiError> {
    let existing = found(state.db.get_comment(&id).await?, "comment", &id)?;
    ensure_author(&user, &existing.author_id, "edit this comment")?;
    let comment = state.db.update_comment(&id, &input).await?;
    Ok(Json(json!({ "message": "Comment updated successfully!", "comment": comment })))
}
