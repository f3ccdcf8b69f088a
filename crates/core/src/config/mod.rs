//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (OFFSHELF_*)
//! 2. TOML config file (if OFFSHELF_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::CacheNamespace;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (OFFSHELF_*)
/// 2. TOML config file (if OFFSHELF_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database holding the blob cache and book store.
    ///
    /// Set via OFFSHELF_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin the app shell is served from; precache entries resolve against it.
    ///
    /// Set via OFFSHELF_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Blob cache namespace name (without version).
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Running cache version. Namespaces with any other suffix are purged on activate.
    #[serde(default = "default_version")]
    pub cache_version: u32,

    /// Book store schema version.
    #[serde(default = "default_version")]
    pub schema_version: u32,

    /// Network deadline for static assets before falling back to the cache.
    ///
    /// Set via OFFSHELF_STATIC_TIMEOUT_MS environment variable.
    #[serde(default = "default_static_timeout_ms")]
    pub static_timeout_ms: u64,

    /// Network deadline for API calls before falling back to the cache.
    ///
    /// Set via OFFSHELF_API_TIMEOUT_MS environment variable.
    #[serde(default = "default_api_timeout_ms")]
    pub api_timeout_ms: u64,

    /// Lifetime of written-back API responses (added to now for the `max-age` marker).
    #[serde(default = "default_api_max_age_ms")]
    pub api_max_age_ms: u64,

    /// Case-insensitive pattern identifying the origin API host.
    #[serde(default = "default_api_pattern")]
    pub api_pattern: String,

    /// Case-insensitive pattern for static assets served from the API host.
    #[serde(default = "default_static_exception_pattern")]
    pub static_exception_pattern: String,

    /// Install manifest, relative to `origin`.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via OFFSHELF_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Start with the network marked unavailable.
    #[serde(default)]
    pub start_offline: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./offshelf.sqlite")
}

fn default_origin() -> String {
    "http://localhost:5000/".into()
}

fn default_cache_name() -> String {
    "network-or-cache".into()
}

fn default_version() -> u32 {
    1
}

fn default_static_timeout_ms() -> u64 {
    400
}

fn default_api_timeout_ms() -> u64 {
    1_000
}

fn default_api_max_age_ms() -> u64 {
    6 * 60 * 60 * 1000 // 6h
}

fn default_api_pattern() -> String {
    "openlibrary".into()
}

fn default_static_exception_pattern() -> String {
    "covers".into()
}

fn default_precache() -> Vec<String> {
    [
        "./",
        "./index.html",
        "./bundle.css",
        "./global.css",
        "./bundle.js",
        "./data/navigation.json",
        "./manifest.json",
        "./icon.png",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_user_agent() -> String {
    "offshelf/0.1".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            cache_name: default_cache_name(),
            cache_version: default_version(),
            schema_version: default_version(),
            static_timeout_ms: default_static_timeout_ms(),
            api_timeout_ms: default_api_timeout_ms(),
            api_max_age_ms: default_api_max_age_ms(),
            api_pattern: default_api_pattern(),
            static_exception_pattern: default_static_exception_pattern(),
            precache: default_precache(),
            user_agent: default_user_agent(),
            start_offline: false,
        }
    }
}

impl AppConfig {
    pub fn static_timeout(&self) -> Duration {
        Duration::from_millis(self.static_timeout_ms)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    pub fn api_max_age(&self) -> Duration {
        Duration::from_millis(self.api_max_age_ms)
    }

    /// The namespace this worker version reads and writes.
    pub fn namespace(&self) -> CacheNamespace {
        CacheNamespace::new(self.cache_name.clone(), self.cache_version)
    }

    /// Parsed `origin`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin is not an http(s) URL.
    pub fn origin_url(&self) -> Result<url::Url, ConfigError> {
        let origin = url::Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;
        match origin.scheme() {
            "http" | "https" => Ok(origin),
            scheme => Err(ConfigError::Invalid { field: "origin".into(), reason: format!("unsupported scheme {scheme}") }),
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `OFFSHELF_`
    /// 2. TOML file from `OFFSHELF_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("OFFSHELF_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("OFFSHELF_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./offshelf.sqlite"));
        assert_eq!(config.cache_name, "network-or-cache");
        assert_eq!(config.cache_version, 1);
        assert_eq!(config.schema_version, 1);
        assert_eq!(config.static_timeout_ms, 400);
        assert_eq!(config.api_timeout_ms, 1_000);
        assert_eq!(config.api_max_age_ms, 21_600_000);
        assert_eq!(config.precache.len(), 8);
        assert!(config.precache.contains(&"./data/navigation.json".to_string()));
        assert!(!config.start_offline);
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.static_timeout(), Duration::from_millis(400));
        assert_eq!(config.api_timeout(), Duration::from_secs(1));
        assert_eq!(config.api_max_age(), Duration::from_secs(6 * 60 * 60));
    }

    #[test]
    fn test_namespace() {
        let config = AppConfig { cache_version: 4, ..Default::default() };
        assert_eq!(config.namespace().to_string(), "network-or-cache:4");
    }

    #[test]
    fn test_origin_url() {
        let config = AppConfig::default();
        assert_eq!(config.origin_url().unwrap().as_str(), "http://localhost:5000/");

        let config = AppConfig { origin: "ftp://example.com/".into(), ..Default::default() };
        assert!(matches!(config.origin_url(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_toml_layer_overrides_defaults() {
        let toml = r#"
            cache_version = 3
            api_timeout_ms = 750
            precache = ["./", "./index.html"]
            start_offline = true
        "#;
        let figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::string(toml));
        let config = AppConfig::extract(figment).unwrap();

        assert_eq!(config.cache_version, 3);
        assert_eq!(config.api_timeout_ms, 750);
        assert_eq!(config.precache, vec!["./".to_string(), "./index.html".to_string()]);
        assert!(config.start_offline);
        assert_eq!(config.static_timeout_ms, 400);
    }

    #[test]
    fn test_invalid_layer_fails_validation() {
        let figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::string("cache_version = 0"));
        assert!(matches!(AppConfig::extract(figment), Err(ConfigError::Invalid { field, .. }) if field == "cache_version"));
    }
}
