//! In-process response cache with TTL expiry and bulk invalidation.
//!
//! Entries are keyed by request path and raw query (see [`key::cache_key`])
//! and expire lazily: an expired entry is never returned, and is swept out
//! when the map runs full. Any write to the backing data invalidates the
//! whole map.
//!
//! Readers share a [`tokio::sync::RwLock`]; `set` and `invalidate_all` take
//! it exclusively. Bodies are fully materialized [`Bytes`] before the lock is
//! taken, so no I/O ever happens under it.

pub mod key;

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use tokio::sync::RwLock;
use tokio::time::Instant;

pub use key::cache_key;

/// Tunables for [`ResponseCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub max_entries: usize,
    pub max_body_bytes: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { ttl: Duration::from_secs(60), max_entries: 10_000, max_body_bytes: 1_048_576 }
    }
}

/// Why a response was not stored. Callers treat every variant as "not cached".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("only 200 responses are cached, got {0}")]
    NotCacheable(StatusCode),

    #[error("body of {size} bytes exceeds limit of {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("cache is full ({0} live entries)")]
    Full(usize),

    #[error("cache was invalidated while the response was produced")]
    Stale,

    #[error("ttl of {0:?} overflows the clock")]
    TtlOverflow(Duration),
}

/// A captured response, replayed byte-for-byte on a hit.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: CachedResponse,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Invalidation epoch observed before a handler ran.
///
/// Passing it to [`ResponseCache::set_if_unchanged`] drops the store if any
/// invalidation happened in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    generation: u64,
}

/// Process-wide GET response cache.
#[derive(Debug)]
pub struct ResponseCache {
    settings: CacheSettings,
    inner: RwLock<Inner>,
}

impl ResponseCache {
    pub fn new(settings: CacheSettings) -> Self {
        Self { settings, inner: RwLock::new(Inner::default()) }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Look up a live entry. Expired entries are treated as absent.
    pub async fn get(&self, key: &str) -> Option<CachedResponse> {
        let inner = self.inner.read().await;
        let entry = inner.entries.get(key)?;
        entry.is_live(Instant::now()).then(|| entry.response.clone())
    }

    /// The current invalidation epoch.
    pub async fn generation(&self) -> Generation {
        Generation(self.inner.read().await.generation)
    }

    /// Store a response, overwriting any existing entry for `key`.
    ///
    /// # Errors
    ///
    /// Refuses non-200 responses, bodies above `max_body_bytes`, and new keys
    /// when the map is full of live entries.
    pub async fn set(&self, key: &str, response: CachedResponse) -> Result<(), CacheError> {
        self.admit(&response)?;
        let mut inner = self.inner.write().await;
        self.insert(&mut inner, key, response)
    }

    /// Like [`set`](Self::set), but only if no invalidation happened since
    /// `since` was observed.
    pub async fn set_if_unchanged(&self, key: &str, response: CachedResponse, since: Generation) -> Result<(), CacheError> {
        self.admit(&response)?;
        let mut inner = self.inner.write().await;
        if inner.generation != since.0 {
            return Err(CacheError::Stale);
        }
        self.insert(&mut inner, key, response)
    }

    /// Drop every entry. Returns how many were removed.
    pub async fn invalidate_all(&self) -> usize {
        let mut inner = self.inner.write().await;
        inner.generation = inner.generation.wrapping_add(1);
        let removed = inner.entries.len();
        inner.entries.clear();
        removed
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn admit(&self, response: &CachedResponse) -> Result<(), CacheError> {
        if response.status != StatusCode::OK {
            return Err(CacheError::NotCacheable(response.status));
        }
        if response.body.len() > self.settings.max_body_bytes {
            return Err(CacheError::TooLarge { size: response.body.len(), limit: self.settings.max_body_bytes });
        }
        Ok(())
    }

    fn insert(&self, inner: &mut Inner, key: &str, response: CachedResponse) -> Result<(), CacheError> {
        let now = Instant::now();
        let expires_at = now.checked_add(self.settings.ttl).ok_or(CacheError::TtlOverflow(self.settings.ttl))?;
        if !inner.entries.contains_key(key) && inner.entries.len() >= self.settings.max_entries {
            inner.entries.retain(|_, entry| entry.is_live(now));
            if inner.entries.len() >= self.settings.max_entries {
                return Err(CacheError::Full(inner.entries.len()));
            }
        }

        inner
            .entries
            .insert(key.to_string(), CacheEntry { response, expires_at });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CONTENT_TYPE;

    fn ok(body: &'static str) -> CachedResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "application/json".parse().unwrap());
        CachedResponse { status: StatusCode::OK, headers, body: Bytes::from_static(body.as_bytes()) }
    }

    fn cache(ttl_secs: u64, max_entries: usize) -> ResponseCache {
        ResponseCache::new(CacheSettings { ttl: Duration::from_secs(ttl_secs), max_entries, max_body_bytes: 64 })
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = cache(60, 10);
        cache.set("/api/v1/students", ok("[]")).await.unwrap();
        let hit = cache.get("/api/v1/students").await.unwrap();
        assert_eq!(hit, ok("[]"));
        assert!(cache.get("/api/v1/students?page=2").await.is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let cache = cache(60, 10);
        cache.set("/a", ok("one")).await.unwrap();
        cache.set("/a", ok("two")).await.unwrap();
        assert_eq!(cache.get("/a").await.unwrap().body, Bytes::from_static(b"two"));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_not_returned() {
        let cache = cache(60, 10);
        cache.set("/a", ok("x")).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("/a").await.is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("/a").await.is_none());
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_non_200_is_refused() {
        let cache = cache(60, 10);
        let mut response = ok("{}");
        response.status = StatusCode::NOT_FOUND;
        assert_eq!(cache.set("/a", response).await, Err(CacheError::NotCacheable(StatusCode::NOT_FOUND)));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_oversized_body_is_refused() {
        let cache = cache(60, 10);
        let big = CachedResponse { body: Bytes::from(vec![b'x'; 65]), ..ok("") };
        assert!(matches!(cache.set("/a", big).await, Err(CacheError::TooLarge { size: 65, limit: 64 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cache_sweeps_expired_entries() {
        let cache = cache(10, 2);
        cache.set("/a", ok("a")).await.unwrap();
        cache.set("/b", ok("b")).await.unwrap();
        assert_eq!(cache.set("/c", ok("c")).await, Err(CacheError::Full(2)));

        cache.set("/a", ok("a2")).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        cache.set("/c", ok("c")).await.unwrap();
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("/c").await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let cache = cache(60, 10);
        cache.set("/a", ok("a")).await.unwrap();
        cache.set("/b?x=1", ok("b")).await.unwrap();

        assert_eq!(cache.invalidate_all().await, 2);
        assert!(cache.get("/a").await.is_none());
        assert!(cache.is_empty().await);
        assert_eq!(cache.invalidate_all().await, 0);
    }

    #[tokio::test]
    async fn test_set_if_unchanged_drops_stale_capture() {
        let cache = cache(60, 10);
        let before = cache.generation().await;
        cache.invalidate_all().await;

        assert_eq!(cache.set_if_unchanged("/a", ok("old"), before).await, Err(CacheError::Stale));
        assert!(cache.get("/a").await.is_none());

        let now = cache.generation().await;
        cache.set_if_unchanged("/a", ok("new"), now).await.unwrap();
        assert!(cache.get("/a").await.is_some());
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_is_not_cached() {
        let cache = ResponseCache::new(CacheSettings { ttl: Duration::MAX, ..Default::default() });
        assert_eq!(cache.set("/a", ok("[]")).await, Err(CacheError::TtlOverflow(Duration::MAX)));
        assert!(cache.is_empty().await);
    }
}
