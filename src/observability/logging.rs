//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Configure log level from config, overridable by `RUST_LOG`
//! - Optionally tee log lines into a file
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, console format for development
//! - Installation is fallible, never a panic: tests and embedders may install their own

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::{
    filter::ParseError, layer::Layered, layer::SubscriberExt, util::SubscriberInitExt,
    util::TryInitError, EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

type BoxedLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level `{level}`: {source}")]
    InvalidLevel {
        level: String,
        #[source]
        source: ParseError,
    },

    #[error("cannot open log file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("a global subscriber is already installed: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => default_filter(&config.level)?,
    };

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.format == "json" {
        layers.push(tracing_subscriber::fmt::layer().json().boxed());
    } else {
        layers.push(tracing_subscriber::fmt::layer().boxed());
    }

    if let Some(path) = &config.file {
        let file = open_log_file(path).map_err(|source| LoggingError::File {
            path: path.clone(),
            source,
        })?;
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()?;

    tracing::debug!(level = %config.level, format = %config.format, file = ?config.file, "Logging initialized");
    Ok(())
}

fn default_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(format!("apphost={level},tower_http={level},{level}", level = level)).map_err(
        |source| LoggingError::InvalidLevel {
            level: level.to_string(),
            source,
        },
    )
}

fn open_log_file(path: &str) -> std::io::Result<std::fs::File> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}
