//! Request pipeline layers.
//!
//! Routes are wrapped per method: the authorization gate runs first, the
//! response cache sits inside it, so a cached body is only ever replayed to a
//! caller the route admits.

pub mod auth;
pub mod cache;
pub mod request_id;

use axum::middleware::from_fn_with_state;
use axum::routing::MethodRouter;
use schoolhouse_core::models::Role;

use crate::AppState;
pub use auth::{ANY, CurrentUser, Gate, STAFF, STAFF_FACULTY, require_roles};
pub use cache::{CacheState, cache_responses};

/// Wrap with the response cache only (public routes).
pub fn cached(route: MethodRouter<AppState>, state: &AppState) -> MethodRouter<AppState> {
    match &state.cache {
        Some(cache) => route.route_layer(from_fn_with_state(
            CacheState::new(cache.clone(), state.cache_bypass.clone()),
            cache_responses,
        )),
        None => route,
    }
}

/// Wrap with the response cache, then the authorization gate for `roles`.
pub fn guarded(route: MethodRouter<AppState>, roles: &'static [Role], state: &AppState) -> MethodRouter<AppState> {
    cached(route, state).route_layer(from_fn_with_state(Gate::new(state.db.clone(), roles), require_roles))
}
