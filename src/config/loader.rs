//! Configuration loading from disk or from a key/value source.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{AppConfig, RunMode, TlsConfig};
use crate::config::source::ConfigSource;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading and registration-time checks.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value `{value}` for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Unsupported database driver `{0}` (supported: sqlite, postgres, mysql)")]
    UnsupportedDriver(String),

    #[error("Invalid schedule `{expr}`: {reason}")]
    InvalidSchedule { expr: String, reason: String },

    #[error("Invalid route {method} {path}: {reason}")]
    InvalidRoute {
        method: String,
        path: String,
        reason: String,
    },

    #[error("Static directory {0:?} does not exist")]
    MissingDirectory(String),

    #[error("Component `{0}` is already running; register before it starts")]
    AlreadyRunning(String),

    #[error("Component id `{0}` is taken by another component")]
    DuplicateComponent(String),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

impl AppConfig {
    /// Build a configuration from well-known keys, starting from defaults.
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self, ConfigError> {
        let defaults = AppConfig::default();
        let mut config = defaults.clone();

        config.http.host = source.get_string("HTTP_HOST", &defaults.http.host);
        config.http.port = port(source, "HTTP_PORT", defaults.http.port)?;
        config.http.mode = match source.get("HTTP_MODE") {
            Some(raw) => raw.parse::<RunMode>().map_err(|reason| ConfigError::InvalidValue {
                key: "HTTP_MODE".to_string(),
                value: raw.clone(),
                reason,
            })?,
            None => defaults.http.mode,
        };
        let cert = source.get_string("CERT_FILE", "");
        let key = source.get_string("KEY_FILE", "");
        if !cert.is_empty() || !key.is_empty() {
            config.http.tls = Some(TlsConfig {
                cert_path: cert,
                key_path: key,
            });
        }

        config.logging.level = source.get_string("LOG_LEVEL", &defaults.logging.level);
        config.logging.format = source.get_string("LOG_FORMAT", &defaults.logging.format);
        config.logging.file = source.get("LOG_FILE").filter(|f| !f.is_empty());

        config.database.driver = source.get_string("DB_DRIVER", "");
        config.database.host = source.get_string("DB_HOST", "");
        config.database.port = port(source, "DB_PORT", defaults.database.port)?;
        config.database.username = source.get_string("DB_USERNAME", "");
        config.database.password = source.get_string("DB_PASSWORD", "");
        config.database.name = source.get_string("DB_NAME", "");
        config.database.params = source.get_string("DB_PARAMS", "");
        config.database.max_connections = non_negative(
            source,
            "DB_MAX_CONNECTIONS",
            defaults.database.max_connections as i64,
        )? as u32;

        config.cache.host = source.get_string("REDIS_HOST", "");
        config.cache.port = port(source, "REDIS_PORT", defaults.cache.port)?;
        config.cache.username = source.get_string("REDIS_USERNAME", "");
        config.cache.password = source.get_string("REDIS_PASSWORD", "");
        config.cache.db = non_negative(source, "REDIS_DB", defaults.cache.db)?;

        config.shutdown.timeout_secs = non_negative(
            source,
            "SHUTDOWN_TIMEOUT_SECS",
            defaults.shutdown.timeout_secs as i64,
        )? as u64;

        config.metrics.enabled = source.get_bool("METRICS_ENABLED", defaults.metrics.enabled)?;
        config.metrics.address = source.get_string("METRICS_ADDRESS", &defaults.metrics.address);

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

fn port(source: &dyn ConfigSource, key: &str, default: u16) -> Result<u16, ConfigError> {
    let raw = source.get_int(key, default as i64)?;
    u16::try_from(raw).map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
        reason: "port out of range".to_string(),
    })
}

fn non_negative(source: &dyn ConfigSource, key: &str, default: i64) -> Result<i64, ConfigError> {
    let raw = source.get_int(key, default)?;
    if raw < 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason: "must not be negative".to_string(),
        });
    }
    Ok(raw)
}
