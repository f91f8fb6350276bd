//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the host.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the application host.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server settings (bind address, TLS, mode).
    pub http: HttpConfig,

    /// Logging settings.
    pub logging: LoggingConfig,

    /// Optional database connection.
    pub database: DatabaseConfig,

    /// Optional cache connection.
    pub cache: CacheConfig,

    /// Shutdown policy.
    pub shutdown: ShutdownConfig,

    /// Metrics exporter settings.
    pub metrics: MetricsConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Host name or IP to bind.
    pub host: String,

    /// Port to bind. `0` picks an ephemeral port.
    pub port: u16,

    /// Optional TLS material.
    pub tls: Option<TlsConfig>,

    /// Run mode; debug mode traces requests at INFO.
    pub mode: RunMode,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl HttpConfig {
    /// `host:port` as configured, before resolution.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            tls: None,
            mode: RunMode::Release,
            request_timeout_secs: 30,
        }
    }
}

/// TLS configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Debug,
    #[default]
    Release,
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(RunMode::Debug),
            "release" => Ok(RunMode::Release),
            other => Err(format!("unknown mode `{}` (expected debug or release)", other)),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Debug => write!(f, "debug"),
            RunMode::Release => write!(f, "release"),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub level: String,

    /// Output format: `console` or `json`.
    pub format: String,

    /// Optional file to append log lines to, in addition to stdout.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "console".to_string(),
            file: None,
        }
    }
}

/// Database configuration. An empty driver means "no database".
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `sqlite`, `postgres` or `mysql`.
    pub driver: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,

    /// Database name, or the file path for sqlite.
    pub name: String,

    /// Extra connection parameters appended as a query string.
    pub params: String,

    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: String::new(),
            host: String::new(),
            port: 0,
            username: String::new(),
            password: String::new(),
            name: String::new(),
            params: String::new(),
            max_connections: 10,
            connect_timeout_secs: 5,
        }
    }
}

/// Cache (Redis) configuration. An empty host means "no cache".
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub db: i64,
    pub connect_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 6379,
            username: String::new(),
            password: String::new(),
            db: 0,
            connect_timeout_secs: 5,
        }
    }
}

/// Shutdown policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Fixed ceiling for the whole shutdown, in seconds.
    pub timeout_secs: u64,

    /// Listen for SIGINT/SIGTERM while running.
    pub handle_signals: bool,

    /// Exit the process immediately on a second termination signal.
    pub force_exit_on_repeat: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            handle_signals: true,
            force_exit_on_repeat: true,
        }
    }
}

/// Metrics exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Install the Prometheus exporter.
    pub enabled: bool,

    /// Exporter bind address.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0:9090".to_string(),
        }
    }
}
