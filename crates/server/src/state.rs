//! Shared application state handed to every handler and middleware.

use std::sync::Arc;

use schoolhouse_core::{AppConfig, Database, ResponseCache};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// `None` when caching is disabled in configuration.
    pub cache: Option<Arc<ResponseCache>>,
    /// Path prefixes the cache never touches.
    pub cache_bypass: Arc<[String]>,
    pub session_ttl: chrono::Duration,
}

impl AppState {
    pub fn new(db: Database, config: &AppConfig) -> Self {
        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(ResponseCache::new(config.cache_settings())));
        Self {
            db,
            cache,
            cache_bypass: config.cache.bypass_paths.clone().into(),
            session_ttl: config.session_ttl(),
        }
    }
}
