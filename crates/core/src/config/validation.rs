//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::{AppConfig, MAX_CACHE_TTL_SECS, MAX_SESSION_TTL_HOURS};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `bind_addr` is empty
    /// - `session_ttl_hours` is 0
    /// - caching is enabled with a zero TTL or zero capacity
    /// - a bypass path does not start with `/`
    /// - `retry.max_attempts` is 0 or the initial delay exceeds the max delay
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr.is_empty() {
            return Err(ConfigError::Invalid { field: "bind_addr".into(), reason: "must not be empty".into() });
        }

        if self.session_ttl_hours == 0 {
            return Err(ConfigError::Invalid {
                field: "session_ttl_hours".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.session_ttl_hours > MAX_SESSION_TTL_HOURS {
            return Err(ConfigError::Invalid {
                field: "session_ttl_hours".into(),
                reason: format!("must not exceed {MAX_SESSION_TTL_HOURS}"),
            });
        }

        if self.cache.enabled {
            if self.cache.ttl_secs == 0 {
                return Err(ConfigError::Invalid {
                    field: "cache.ttl_secs".into(),
                    reason: "must be greater than 0 when caching is enabled".into(),
                });
            }
            if self.cache.ttl_secs > MAX_CACHE_TTL_SECS {
                return Err(ConfigError::Invalid {
                    field: "cache.ttl_secs".into(),
                    reason: format!("must not exceed {MAX_CACHE_TTL_SECS}"),
                });
            }
            if self.cache.max_entries == 0 {
                return Err(ConfigError::Invalid {
                    field: "cache.max_entries".into(),
                    reason: "must be greater than 0 when caching is enabled".into(),
                });
            }
        }

        if let Some(path) = self.cache.bypass_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::Invalid {
                field: "cache.bypass_paths".into(),
                reason: format!("`{path}` must start with '/'"),
            });
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid {
                field: "retry.initial_delay_ms".into(),
                reason: "must not exceed retry.max_delay_ms".into(),
            });
        }

        if !self.cache.enabled && self.cache.bypass_paths.len() > 0 {
            tracing::debug!(
                bypass_count = self.cache.bypass_paths.len(),
                "cache disabled; bypass_paths has no effect"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, RetryConfig};

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_bind_addr() {
        let config = AppConfig { bind_addr: String::new(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "bind_addr"));
    }

    #[test]
    fn test_validate_zero_session_ttl() {
        let config = AppConfig { session_ttl_hours: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "session_ttl_hours"));
    }

    #[test]
    fn test_validate_zero_cache_ttl() {
        let config = AppConfig { cache: CacheConfig { ttl_secs: 0, ..Default::default() }, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "cache.ttl_secs"));
    }

    #[test]
    fn test_validate_unbounded_cache_ttl() {
        let config =
            AppConfig { cache: CacheConfig { ttl_secs: u64::MAX, ..Default::default() }, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "cache.ttl_secs"));
    }

    #[test]
    fn test_validate_unbounded_session_ttl() {
        let config = AppConfig { session_ttl_hours: u64::MAX, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "session_ttl_hours"));
    }

    #[test]
    fn test_validate_zero_cache_ttl_when_disabled() {
        let config = AppConfig {
            cache: CacheConfig { enabled: false, ttl_secs: 0, ..Default::default() },
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_relative_bypass_path() {
        let config = AppConfig {
            cache: CacheConfig { bypass_paths: vec!["health".into()], ..Default::default() },
            ..Default::default()
        };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "cache.bypass_paths"));
    }

    #[test]
    fn test_validate_zero_retry_attempts() {
        let config = AppConfig { retry: RetryConfig { max_attempts: 0, ..Default::default() }, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "retry.max_attempts"));
    }

    #[test]
    fn test_validate_inverted_retry_delays() {
        let config = AppConfig {
            retry: RetryConfig { max_attempts: 3, initial_delay_ms: 5_000, max_delay_ms: 100 },
            ..Default::default()
        };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "retry.initial_delay_ms"));
    }
}
