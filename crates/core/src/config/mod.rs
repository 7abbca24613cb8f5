//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SCHOOLHOUSE_*)
//! 2. TOML config file (if SCHOOLHOUSE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::CacheSettings;
use crate::db::RetryPolicy;

mod validation;

pub use validation::ConfigError;

/// Upper bound for `cache.ttl_secs` (one year).
pub const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Upper bound for `session_ttl_hours` (one year).
pub const MAX_SESSION_TTL_HOURS: u64 = 365 * 24;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SCHOOLHOUSE_*, nested keys separated by `__`)
/// 2. TOML config file (if SCHOOLHOUSE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database.
    ///
    /// Set via SCHOOLHOUSE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Socket address the HTTP server binds to.
    ///
    /// Set via SCHOOLHOUSE_BIND_ADDR environment variable.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Directory of paired `.up.sql`/`.down.sql` migration scripts.
    ///
    /// When unset, the migrations embedded in the binary are used.
    #[serde(default)]
    pub migrations_dir: Option<PathBuf>,

    /// Apply pending migrations before serving traffic.
    #[serde(default = "default_true")]
    pub auto_migrate: bool,

    /// Lifetime of a login session.
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u64,

    /// Response cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Startup connection retry settings.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Response cache section (`[cache]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds a cached GET response stays servable.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,

    /// Responses with larger bodies are passed through without being stored.
    #[serde(default = "default_cache_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Path prefixes excluded from caching and invalidation regardless of verb.
    #[serde(default = "default_bypass_paths")]
    pub bypass_paths: Vec<String>,
}

/// Startup retry section (`[retry]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./schoolhouse.sqlite")
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".into()
}

fn default_true() -> bool {
    true
}

fn default_session_ttl_hours() -> u64 {
    24
}

fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_cache_max_entries() -> usize {
    10_000
}

fn default_cache_max_body_bytes() -> usize {
    1_048_576 // 1MB
}

fn default_bypass_paths() -> Vec<String> {
    vec!["/health".into(), "/api/v1/auth/login".into()]
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_initial_delay_ms() -> u64 {
    1_000
}

fn default_retry_max_delay_ms() -> u64 {
    8_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl_secs(),
            max_entries: default_cache_max_entries(),
            max_body_bytes: default_cache_max_body_bytes(),
            bypass_paths: default_bypass_paths(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            initial_delay_ms: default_retry_initial_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind_addr: default_bind_addr(),
            migrations_dir: None,
            auto_migrate: true,
            session_ttl_hours: default_session_ttl_hours(),
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Session lifetime as a chrono duration for expiry arithmetic.
    ///
    /// Saturates at [`MAX_SESSION_TTL_HOURS`]; `validate` rejects anything
    /// larger.
    pub fn session_ttl(&self) -> chrono::Duration {
        let hours = i64::try_from(self.session_ttl_hours.min(MAX_SESSION_TTL_HOURS)).unwrap_or(0);
        chrono::Duration::try_hours(hours).unwrap_or(chrono::Duration::zero())
    }

    /// Settings for constructing the response cache.
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            ttl: Duration::from_secs(self.cache.ttl_secs),
            max_entries: self.cache.max_entries,
            max_body_bytes: self.cache.max_body_bytes,
        }
    }

    /// Backoff policy for the startup database connection.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SCHOOLHOUSE_`
    /// 2. TOML file from `SCHOOLHOUSE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SCHOOLHOUSE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SCHOOLHOUSE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
