//! Read-through response caching for GET and invalidation on writes.
//!
//! - bypassed paths pass through untouched, whatever the verb
//! - GET: serve a live entry verbatim without running the handler, or run
//!   the handler, capture a 200 body and store it
//! - POST/PUT/DELETE: run the handler, then drop every entry
//! - anything else passes through

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::extract::{OriginalUri, State};
use axum::http::{Method, Request, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use schoolhouse_core::cache::{CachedResponse, ResponseCache, cache_key};
use schoolhouse_core::Error;

use crate::error::ApiError;

/// Middleware state.
#[derive(Clone)]
pub struct CacheState {
    cache: Arc<ResponseCache>,
    bypass: Arc<[String]>,
}

impl CacheState {
    pub fn new(cache: Arc<ResponseCache>, bypass: Arc<[String]>) -> Self {
        Self { cache, bypass }
    }

    /// Whole-segment prefix match: `/health` covers `/health/db` but not `/healthz`.
    fn is_bypassed(&self, path: &str) -> bool {
        self.bypass.iter().any(|prefix| {
            let prefix = prefix.trim_end_matches('/');
            match path.strip_prefix(prefix) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            }
        })
    }
}

/// The full request URI, before any `nest` stripped its prefix.
fn request_uri(req: &Request<Body>) -> Uri {
    req.extensions()
        .get::<OriginalUri>()
        .map(|original| original.0.clone())
        .unwrap_or_else(|| req.uri().clone())
}

pub async fn cache_responses(State(state): State<CacheState>, req: Request<Body>, next: Next) -> Response {
    let uri = request_uri(&req);
    if state.is_bypassed(uri.path()) {
        return next.run(req).await;
    }

    match *req.method() {
        Method::GET => read_through(&state.cache, &uri, req, next).await,
        Method::POST | Method::PUT | Method::DELETE => {
            let response = next.run(req).await;
            let removed = state.cache.invalidate_all().await;
            tracing::debug!(path = %uri.path(), status = response.status().as_u16(), removed, "cache invalidated");
            response
        }
        _ => next.run(req).await,
    }
}

async fn read_through(cache: &ResponseCache, uri: &Uri, req: Request<Body>, next: Next) -> Response {
    let key = cache_key(uri.path(), uri.query());

    if let Some(hit) = cache.get(&key).await {
        tracing::debug!(key = %key, "cache hit");
        return replay(hit);
    }

    let generation = cache.generation().await;
    let response = next.run(req).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "failed to read response body");
            return ApiError(Error::Internal(format!("failed to read response body: {e}"))).into_response();
        }
    };

    let captured = CachedResponse { status: parts.status, headers: parts.headers.clone(), body: bytes.clone() };
    match cache.set_if_unchanged(&key, captured, generation).await {
        Ok(()) => tracing::debug!(key = %key, "cache miss, stored"),
        Err(reason) => tracing::warn!(key = %key, reason = %reason, "cache miss, not stored"),
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn replay(hit: CachedResponse) -> Response {
    let mut response = Response::new(Body::from(hit.body));
    *response.status_mut() = hit.status;
    *response.headers_mut() = hit.headers;
    response
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use schoolhouse_core::CacheSettings;
    use tower::ServiceExt;

    use super::*;

    struct Harness {
        app: Router,
        cache: Arc<ResponseCache>,
        calls: Arc<AtomicUsize>,
    }

    fn harness() -> Harness {
        let cache = Arc::new(ResponseCache::new(CacheSettings::default()));
        let calls = Arc::new(AtomicUsize::new(0));
        let state = CacheState::new(cache.clone(), vec!["/health".to_string()].into());

        let counter = calls.clone();
        let list = move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                ([("x-handler-run", n.to_string())], format!("[{n}]"))
            }
        };
        let counter = calls.clone();
        let missing = move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                (StatusCode::NOT_FOUND, "nope")
            }
        };
        let counter = calls.clone();
        let health = move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                "ok"
            }
        };

        let app = Router::new()
            .route("/students", get(list).post(|| async { StatusCode::CREATED }))
            .route("/missing", get(missing))
            .route("/health", get(health.clone()))
            .route("/healthz", get(health))
            .route_layer(from_fn_with_state(state, cache_responses));

        Harness { app, cache, calls }
    }

    async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, String, Option<String>) {
        let req = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let run = response
            .headers()
            .get("x-handler-run")
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap(), run)
    }

    #[tokio::test]
    async fn test_second_get_is_served_from_cache() {
        let h = harness();
        let first = send(&h.app, Method::GET, "/students").await;
        let second = send(&h.app, Method::GET, "/students").await;

        assert_eq!(first, (StatusCode::OK, "[1]".to_string(), Some("1".to_string())));
        assert_eq!(second, first);
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_query_string_is_part_of_key() {
        let h = harness();
        send(&h.app, Method::GET, "/students?a=1&b=2").await;
        send(&h.app, Method::GET, "/students?b=2&a=1").await;
        send(&h.app, Method::GET, "/students?a=1&b=2").await;
        assert_eq!(h.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_post_invalidates() {
        let h = harness();
        send(&h.app, Method::GET, "/students").await;
        let (status, _, _) = send(&h.app, Method::POST, "/students").await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(h.cache.is_empty().await);

        let (_, body, _) = send(&h.app, Method::GET, "/students").await;
        assert_eq!(body, "[2]");
    }

    #[tokio::test]
    async fn test_non_200_is_not_cached() {
        let h = harness();
        let (status, _, _) = send(&h.app, Method::GET, "/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        send(&h.app, Method::GET, "/missing").await;
        assert_eq!(h.calls.load(Ordering::SeqCst), 2);
        assert!(h.cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_bypass_path_is_never_cached() {
        let h = harness();
        send(&h.app, Method::GET, "/health").await;
        send(&h.app, Method::GET, "/health").await;
        assert_eq!(h.calls.load(Ordering::SeqCst), 2);
        assert!(h.cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_sibling_of_bypass_path_is_cached() {
        let h = harness();
        send(&h.app, Method::GET, "/healthz").await;
        send(&h.app, Method::GET, "/healthz").await;
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.cache.len().await, 1);
    }

    #[test]
    fn test_bypass_matches_whole_segments() {
        let state = CacheState::new(
            Arc::new(ResponseCache::new(CacheSettings::default())),
            vec!["/health".to_string(), "/api/v1/auth/login".to_string()].into(),
        );
        assert!(state.is_bypassed("/health"));
        assert!(state.is_bypassed("/health/db"));
        assert!(state.is_bypassed("/api/v1/auth/login"));
        assert!(!state.is_bypassed("/healthz"));
        assert!(!state.is_bypassed("/health-report"));
        assert!(!state.is_bypassed("/api/v1/auth/register"));
    }

    #[tokio::test]
    async fn test_hit_replays_status_headers_and_body() {
        let h = harness();
        let mut headers = axum::http::HeaderMap::new();
        headers.append("x-multi", "a".parse().unwrap());
        headers.append("x-multi", "b".parse().unwrap());
        let stored = CachedResponse { status: StatusCode::OK, headers, body: "cached".into() };
        h.cache.set("/students", stored).await.unwrap();

        let req = Request::builder().uri("/students").body(Body::empty()).unwrap();
        let response = h.app.clone().oneshot(req).await.unwrap();
        let values: Vec<_> = response.headers().get_all("x-multi").iter().collect();
        assert_eq!(values, vec!["a", "b"]);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"cached");
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }
}
