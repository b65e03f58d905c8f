//! # API Configuration
//!
//! ## Configuration Sources (Priority Order)
//! 1. Environment variables (`TINDAHAN_*`)
//! 2. Config file (`config.toml`; path from `TINDAHAN_CONFIG`, else the
//!    platform config directory)
//! 3. Defaults (this file)
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 8080
//!
//! [database]
//! path = "/var/lib/tindahan/tindahan.db"
//! max_connections = 5
//!
//! [auth]
//! jwt_secret = "change-me"
//! access_lifetime_secs = 43200
//!
//! [engine]
//! pull_page_limit = 500
//! ```
//!
//! Configuration is read-only after startup.

use std::fmt;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use tindahan_sync::EngineConfig;

const DEV_SECRET: &str = "tindahan-dev-secret-change-in-production";

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret for device access tokens.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_access_lifetime")]
    pub access_lifetime_secs: i64,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("access_lifetime_secs", &self.access_lifetime_secs)
            .finish()
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_database_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("tindahan.db"))
        .unwrap_or_else(|| PathBuf::from("tindahan.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_jwt_secret() -> String {
    DEV_SECRET.to_string()
}

fn default_access_lifetime() -> i64 {
    12 * 60 * 60 // one shift
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            jwt_secret: default_jwt_secret(),
            access_lifetime_secs: default_access_lifetime(),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("ph", "tindahan", "tindahan")
}

// =============================================================================
// ApiConfig
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl ApiConfig {
    /// Loads file, then environment, then validates.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os("TINDAHAN_CONFIG")
            .map(PathBuf::from)
            .or_else(|| project_dirs().map(|dirs| dirs.config_dir().join("config.toml")));

        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) => {
                debug!(path = %path.display(), "No config file; using defaults");
                ApiConfig::default()
            }
            None => ApiConfig::default(),
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;

        if config.auth.jwt_secret == DEV_SECRET {
            warn!("Using the development JWT secret; set TINDAHAN_JWT_SECRET in production");
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Overrides fields from `TINDAHAN_*` variables.
    ///
    /// `lookup` is `std::env::var` in production and a map in tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TINDAHAN_BIND_ADDRESS") {
            self.server.bind_address = v;
        }
        if let Some(v) = lookup("TINDAHAN_PORT") {
            self.server.port = parse("TINDAHAN_PORT", &v)?;
        }
        if let Some(v) = lookup("TINDAHAN_DATABASE_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("TINDAHAN_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse("TINDAHAN_DATABASE_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = lookup("TINDAHAN_JWT_SECRET") {
            self.auth.jwt_secret = v;
        }
        if let Some(v) = lookup("TINDAHAN_ACCESS_LIFETIME_SECS") {
            self.auth.access_lifetime_secs = parse("TINDAHAN_ACCESS_LIFETIME_SECS", &v)?;
        }
        if let Some(v) = lookup("TINDAHAN_PENDING_TTL_SECS") {
            self.engine.pending_ttl_secs = parse("TINDAHAN_PENDING_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("TINDAHAN_MAX_BATCH_EVENTS") {
            self.engine.max_batch_events = parse("TINDAHAN_MAX_BATCH_EVENTS", &v)?;
        }
        if let Some(v) = lookup("TINDAHAN_PULL_PAGE_LIMIT") {
            self.engine.pull_page_limit = parse("TINDAHAN_PULL_PAGE_LIMIT", &v)?;
        }
        if let Some(v) = lookup("TINDAHAN_LEDGER_RETRY_LIMIT") {
            self.engine.ledger_retry_limit = parse("TINDAHAN_LEDGER_RETRY_LIMIT", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue("server.port".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue("database.max_connections".to_string()));
        }
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::InvalidValue("auth.jwt_secret".to_string()));
        }
        if self.auth.access_lifetime_secs <= 0 {
            return Err(ConfigError::InvalidValue("auth.access_lifetime_secs".to_string()));
        }
        if let Some(field) = self.engine.invalid_field() {
            return Err(ConfigError::InvalidValue(field.to_string()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }
}

fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config = ApiConfig::from_toml("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.engine, EngineConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_sections() {
        let config = ApiConfig::from_toml(
            r#"
            [server]
            port = 9000

            [database]
            path = "/tmp/store.db"

            [engine]
            max_batch_events = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.database.path, PathBuf::from("/tmp/store.db"));
        assert_eq!(config.engine.max_batch_events, 50);
        assert_eq!(config.engine.pull_page_limit, 500);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = ApiConfig::from_toml("[server]\nport = 9000\n").unwrap();
        config
            .apply_env(env(&[
                ("TINDAHAN_PORT", "7070"),
                ("TINDAHAN_JWT_SECRET", "s3cret"),
                ("TINDAHAN_PULL_PAGE_LIMIT", "25"),
            ]))
            .unwrap();

        assert_eq!(config.server.port, 7070);
        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert_eq!(config.engine.pull_page_limit, 25);
        assert_eq!(config.bind_addr(), "0.0.0.0:7070");
    }

    #[test]
    fn test_invalid_env_value_names_the_variable() {
        let mut config = ApiConfig::default();
        let err = config
            .apply_env(env(&[("TINDAHAN_PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref name) if name == "TINDAHAN_PORT"));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = ApiConfig::default();
        config.engine.max_batch_events = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref name) if name == "engine.max_batch_events"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ApiConfig::default();
        assert!(!format!("{:?}", config).contains(DEV_SECRET));
    }
}
