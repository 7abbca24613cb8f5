//! `/api/v1` route table.
//!
//! Each method is wrapped individually, so one path can mix public,
//! role-restricted and author-checked verbs.

pub mod attendance;
pub mod auth;
pub mod forum;
pub mod grades;
pub mod health;
pub mod students;
pub mod users;

use axum::Router;
use schoolhouse_core::Error;

use crate::AppState;

/// Every API route, relative to `/api/v1`.
pub fn api(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(auth::routes(state))
        .merge(users::routes(state))
        .merge(students::routes(state))
        .merge(attendance::routes(state))
        .merge(grades::routes(state))
        .merge(forum::routes(state))
}

/// Turn a missing row into a 404 naming the entity.
pub(crate) fn found<T>(value: Option<T>, what: &str, id: &str) -> Result<T, Error> {
    value.ok_or_else(|| Error::NotFound(format!("{what} {id}")))
}
