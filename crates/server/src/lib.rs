//! HTTP surface for the schoolhouse backend.
//!
//! The router nests every entity route under `/api/v1`. Each route method is
//! wrapped by the authorization gate and, when enabled, the response cache
//! (see [`middleware`]). Every response carries an `x-request-id`, taken
//! from the request or generated.

pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod startup;
pub mod state;

use axum::Router;
use axum::routing::get;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use middleware::request_id::{MakeRequestUuid, request_span};

pub use state::AppState;

/// Build the complete application router.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .nest("/api/v1", routes::api(&state))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
