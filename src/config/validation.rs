//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (shutdown ceiling > 0)
//! - Detect incomplete pairs (TLS cert without key)
//! - Reject unknown drivers and formats before anything connects
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::AppConfig;
use crate::resources::database::DbDriver;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `http.tls.key_path`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(tls) = &config.http.tls {
        if tls.cert_path.trim().is_empty() {
            errors.push(ValidationError::new("http.tls.cert_path", "must be set when TLS is configured"));
        }
        if tls.key_path.trim().is_empty() {
            errors.push(ValidationError::new("http.tls.key_path", "must be set when TLS is configured"));
        }
    }

    if config.http.request_timeout_secs == 0 {
        errors.push(ValidationError::new("http.request_timeout_secs", "must be greater than zero"));
    }

    match config.logging.format.as_str() {
        "console" | "json" => {}
        other => errors.push(ValidationError::new(
            "logging.format",
            format!("unknown format `{}` (expected console or json)", other),
        )),
    }

    let db = &config.database;
    if !db.driver.is_empty() {
        match db.driver.parse::<DbDriver>() {
            Ok(DbDriver::Sqlite) => {
                if db.name.trim().is_empty() {
                    errors.push(ValidationError::new("database.name", "sqlite requires a file path"));
                }
            }
            Ok(_) => {
                if !db.host.is_empty() && db.name.trim().is_empty() {
                    errors.push(ValidationError::new("database.name", "must be set when a host is configured"));
                }
            }
            Err(e) => errors.push(ValidationError::new("database.driver", e.to_string())),
        }
    }

    if config.shutdown.timeout_secs == 0 {
        errors.push(ValidationError::new("shutdown.timeout_secs", "must be greater than zero"));
    }

    if config.metrics.enabled && config.metrics.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "metrics.address",
            format!("`{}` is not a socket address", config.metrics.address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
