//! Configuration management for SchoolHub
//!
//! Configuration comes from defaults, a TOML file, or `SCHOOLHUB_*`
//! environment variables, and is validated before use.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Local cache configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Remote authority configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Sessions and password hashing
    #[serde(default)]
    pub auth: AuthConfig,

    /// Attachment storage
    #[serde(default)]
    pub blobs: BlobConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Local cache file; no local persistence when absent
    pub cache_path: Option<PathBuf>,
}

/// Remote sync configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the remote authority; local-only when absent
    pub remote_url: Option<String>,

    /// Bound on every remote call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// Argon2 cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHashConfig {
    /// Memory cost in KiB
    pub m_cost: u32,
    /// Iterations
    pub t_cost: u32,
    /// Lanes
    pub p_cost: u32,
}

/// Authentication configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Session token lifetime
    #[serde(with = "humantime_serde")]
    pub session_ttl: Duration,

    #[serde(default)]
    pub password_hash: PasswordHashConfig,
}

/// Blob storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Directory persisted attachments are copied into
    pub root_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_path: Some(PathBuf::from("./data/schoolhub.json")),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            timeout: Duration::from_secs(3),
        }
    }
}

impl Default for PasswordHashConfig {
    fn default() -> Self {
        Self {
            m_cost: 19 * 1024,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(8 * 60 * 60),
            password_hash: PasswordHashConfig::default(),
        }
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./data/blobs"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

fn parse_duration(name: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim())
        .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", name, e)))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: SCHOOLHUB_<SECTION>_<KEY>
    /// Example: SCHOOLHUB_SYNC_REMOTE_URL=https://school.example/api
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like `from_env`, reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Store config
        if let Some(path) = lookup("SCHOOLHUB_STORE_CACHE_PATH") {
            config.store.cache_path = non_empty(path).map(PathBuf::from);
        }

        // Sync config
        if let Some(url) = lookup("SCHOOLHUB_SYNC_REMOTE_URL") {
            config.sync.remote_url = non_empty(url);
        }
        if let Some(timeout) = lookup("SCHOOLHUB_SYNC_TIMEOUT") {
            config.sync.timeout = parse_duration("sync timeout", &timeout)?;
        }

        // Auth config
        if let Some(ttl) = lookup("SCHOOLHUB_AUTH_SESSION_TTL") {
            config.auth.session_ttl = parse_duration("session TTL", &ttl)?;
        }

        // Blob config
        if let Some(root) = lookup("SCHOOLHUB_BLOB_ROOT") {
            config.blobs.root_dir = PathBuf::from(root);
        }

        // Logging config
        if let Some(level) = lookup("SCHOOLHUB_LOG_LEVEL") {
            config.logging.level = level.trim().to_lowercase();
        }
        if let Some(json) = lookup("SCHOOLHUB_LOG_JSON") {
            config.logging.json_format = json
                .trim()
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid JSON flag: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate sync config
        if self.sync.timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "sync timeout must be greater than 0".to_string(),
            ));
        }
        if let Some(url) = &self.sync.remote_url {
            let parsed = reqwest::Url::parse(url)
                .map_err(|e| ConfigError::ValidationFailed(format!("Invalid remote URL: {}", e)))?;
            if !matches!(parsed.scheme(), "http" | "https") || parsed.host().is_none() {
                return Err(ConfigError::ValidationFailed(format!(
                    "Remote URL must be http(s) with a host: {}",
                    url
                )));
            }
        }

        // Validate auth config
        if self.auth.session_ttl.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "session_ttl must be greater than 0".to_string(),
            ));
        }
        let hash = &self.auth.password_hash;
        if hash.p_cost == 0 || hash.t_cost == 0 || hash.m_cost < 8 * hash.p_cost {
            return Err(ConfigError::ValidationFailed(
                "password hash costs are below argon2 minimums".to_string(),
            ));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sync.timeout, Duration::from_secs(3));
        assert_eq!(config.auth.session_ttl, Duration::from_secs(8 * 3600));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.sync.timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        config = Config::default();
        config.auth.session_ttl = Duration::ZERO;
        assert!(config.validate().is_err());

        config = Config::default();
        config.sync.remote_url = Some("not a url".to_string());
        assert!(config.validate().is_err());

        config.sync.remote_url = Some("ftp://school.example".to_string());
        assert!(config.validate().is_err());

        config.sync.remote_url = Some("https://school.example/api".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = Config::default();

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let config = Config::from_lookup(lookup(&[
            ("SCHOOLHUB_SYNC_REMOTE_URL", "http://localhost:8080"),
            ("SCHOOLHUB_SYNC_TIMEOUT", "500ms"),
            ("SCHOOLHUB_AUTH_SESSION_TTL", "1h"),
            ("SCHOOLHUB_STORE_CACHE_PATH", ""),
            ("SCHOOLHUB_LOG_LEVEL", "DEBUG"),
            ("SCHOOLHUB_LOG_JSON", "true"),
        ]))
        .unwrap();

        assert_eq!(config.sync.remote_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.sync.timeout, Duration::from_millis(500));
        assert_eq!(config.auth.session_ttl, Duration::from_secs(3600));
        assert!(config.store.cache_path.is_none());
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        assert!(Config::from_lookup(lookup(&[("SCHOOLHUB_SYNC_TIMEOUT", "soon")])).is_err());
        assert!(Config::from_lookup(lookup(&[("SCHOOLHUB_SYNC_TIMEOUT", "0s")])).is_err());
        assert!(Config::from_lookup(lookup(&[("SCHOOLHUB_LOG_JSON", "maybe")])).is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schoolhub.toml");

        let mut config = Config::default();
        config.sync.remote_url = Some("https://school.example".to_string());
        config.sync.timeout = Duration::from_secs(5);
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
