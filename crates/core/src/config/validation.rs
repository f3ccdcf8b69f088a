//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

const MIN_TIMEOUT_MS: u64 = 50;
const MAX_TIMEOUT_MS: u64 = 30_000;

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - a fallback timeout is outside 50ms..=30s
    /// - `api_max_age_ms` is 0
    /// - `cache_name` is empty or contains `:`
    /// - `cache_version` or `schema_version` is 0
    /// - a request pattern does not compile
    /// - `origin` is not an http(s) URL
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("static_timeout_ms", self.static_timeout_ms), ("api_timeout_ms", self.api_timeout_ms)] {
            if value < MIN_TIMEOUT_MS {
                return Err(invalid(field, format!("must be at least {MIN_TIMEOUT_MS}ms")));
            }
            if value > MAX_TIMEOUT_MS {
                return Err(invalid(field, format!("must not exceed {MAX_TIMEOUT_MS}ms")));
            }
        }

        if self.api_max_age_ms == 0 {
            return Err(invalid("api_max_age_ms", "must be greater than 0"));
        }

        if self.cache_name.is_empty() {
            return Err(invalid("cache_name", "must not be empty"));
        }
        if self.cache_name.contains(':') {
            return Err(invalid("cache_name", "must not contain ':' (reserved for the version suffix)"));
        }

        if self.cache_version == 0 {
            return Err(invalid("cache_version", "must be at least 1"));
        }
        if self.schema_version == 0 {
            return Err(invalid("schema_version", "must be at least 1"));
        }

        for (field, pattern) in
            [("api_pattern", &self.api_pattern), ("static_exception_pattern", &self.static_exception_pattern)]
        {
            if pattern.is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
            regex::Regex::new(pattern).map_err(|e| invalid(field, e.to_string()))?;
        }

        self.origin_url()?;

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.precache.is_empty() {
            tracing::warn!("precache manifest is empty; offline navigation will have no shell to serve");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(config: &AppConfig) -> Option<String> {
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => Some(field),
            _ => None,
        }
    }

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_timeout_too_small() {
        let config = AppConfig { static_timeout_ms: 10, ..Default::default() };
        assert_eq!(field_of(&config).as_deref(), Some("static_timeout_ms"));
    }

    #[test]
    fn test_validate_timeout_exceeds_limit() {
        let config = AppConfig { api_timeout_ms: 30_001, ..Default::default() };
        assert_eq!(field_of(&config).as_deref(), Some("api_timeout_ms"));
    }

    #[test]
    fn test_validate_zero_max_age() {
        let config = AppConfig { api_max_age_ms: 0, ..Default::default() };
        assert_eq!(field_of(&config).as_deref(), Some("api_max_age_ms"));
    }

    #[test]
    fn test_validate_cache_name() {
        let config = AppConfig { cache_name: String::new(), ..Default::default() };
        assert_eq!(field_of(&config).as_deref(), Some("cache_name"));

        let config = AppConfig { cache_name: "shell:v2".into(), ..Default::default() };
        assert_eq!(field_of(&config).as_deref(), Some("cache_name"));
    }

    #[test]
    fn test_validate_versions() {
        let config = AppConfig { cache_version: 0, ..Default::default() };
        assert_eq!(field_of(&config).as_deref(), Some("cache_version"));

        let config = AppConfig { schema_version: 0, ..Default::default() };
        assert_eq!(field_of(&config).as_deref(), Some("schema_version"));
    }

    #[test]
    fn test_validate_bad_pattern() {
        let config = AppConfig { api_pattern: "open(library".into(), ..Default::default() };
        assert_eq!(field_of(&config).as_deref(), Some("api_pattern"));
    }

    #[test]
    fn test_validate_bad_origin() {
        let config = AppConfig { origin: "not a url".into(), ..Default::default() };
        assert_eq!(field_of(&config).as_deref(), Some("origin"));
    }

    #[test]
    fn test_validate_empty_user_agent() {
        let config = AppConfig { user_agent: String::new(), ..Default::default() };
        assert_eq!(field_of(&config).as_deref(), Some("user_agent"));
    }

    #[test]
    fn test_validate_edge_case_values() {
        let config = AppConfig { static_timeout_ms: 50, api_timeout_ms: 30_000, ..Default::default() };
        assert!(config.validate().is_ok());
    }
}
