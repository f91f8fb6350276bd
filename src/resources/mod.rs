//! Shared resources subsystem.
//!
//! # Data Flow
//! ```text
//! AppConfig snapshot
//!     → database.rs (driver? host? → connect → Present | Absent)
//!     → cache.rs    (host? → connect → Present | Absent)
//!     → ResourceContainer (immutable, Arc-shared with every component)
//!     → close() once, after shutdown
//! ```
//!
//! # Design Decisions
//! - Optional resources are an explicit sum type, never a nullable default
//! - A resource that cannot connect degrades to `Absent(Unavailable)`; startup continues
//! - Logging is the process-wide `tracing` dispatcher, always present

pub mod cache;
pub mod database;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::config::{AppConfig, ConfigError, ConfigSource};

pub use cache::Cache;
pub use database::{Database, DbDriver};

/// Why an optional resource is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbsenceReason {
    /// Intentionally not configured.
    NotConfigured,
    /// Configured, but connecting failed at startup.
    Unavailable(String),
}

impl std::fmt::Display for AbsenceReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbsenceReason::NotConfigured => write!(f, "not configured"),
            AbsenceReason::Unavailable(reason) => write!(f, "unavailable: {}", reason),
        }
    }
}

/// A resource that is either present or explicitly absent.
#[derive(Debug)]
pub enum Resource<T> {
    Present(T),
    Absent(AbsenceReason),
}

impl<T> Resource<T> {
    pub fn present(&self) -> Option<&T> {
        match self {
            Resource::Present(value) => Some(value),
            Resource::Absent(_) => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Resource::Present(_))
    }

    pub fn absence(&self) -> Option<&AbsenceReason> {
        match self {
            Resource::Present(_) => None,
            Resource::Absent(reason) => Some(reason),
        }
    }

    /// The resource, or an error naming it and why it is missing.
    pub fn require(&self, name: &'static str) -> Result<&T, ResourceError> {
        match self {
            Resource::Present(value) => Ok(value),
            Resource::Absent(reason) => Err(ResourceError::Unavailable {
                resource: name,
                reason: reason.clone(),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("{resource} is {reason}")]
    Unavailable {
        resource: &'static str,
        reason: AbsenceReason,
    },

    #[error("{0} has been closed")]
    Closed(&'static str),

    #[error("database error: {0}")]
    Database(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("seed statement #{index} failed: {reason}")]
    Seed { index: usize, reason: String },

    #[error("cache error: {0}")]
    Cache(String),
}

/// Process-wide shared resources, built once from a configuration snapshot.
pub struct ResourceContainer {
    config: Arc<AppConfig>,
    source: Arc<dyn ConfigSource>,
    database: Resource<Database>,
    cache: Resource<Cache>,
    closed: AtomicBool,
}

impl ResourceContainer {
    /// Build every resource. Only configuration errors fail the build.
    pub async fn build(config: AppConfig, source: Arc<dyn ConfigSource>) -> Result<Self, ConfigError> {
        let database = Database::connect(&config.database).await?;
        let cache = Cache::connect(&config.cache).await;

        for (name, reason) in [("database", database.absence()), ("cache", cache.absence())] {
            match reason {
                Some(AbsenceReason::Unavailable(detail)) => {
                    tracing::warn!(resource = name, error = %detail, "Resource unavailable, continuing without it")
                }
                Some(AbsenceReason::NotConfigured) => {
                    tracing::debug!(resource = name, "Resource not configured")
                }
                None => {}
            }
        }

        Ok(Self::from_parts(config, source, database, cache))
    }

    /// Assemble a container from already-constructed resources.
    pub fn from_parts(
        config: AppConfig,
        source: Arc<dyn ConfigSource>,
        database: Resource<Database>,
        cache: Resource<Cache>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            source,
            database,
            cache,
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Raw key/value lookups for application-specific settings.
    pub fn source(&self) -> &dyn ConfigSource {
        self.source.as_ref()
    }

    pub fn database(&self) -> &Resource<Database> {
        &self.database
    }

    pub fn cache(&self) -> &Resource<Cache> {
        &self.cache
    }

    /// Close every present resource. Only the first call does any work.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Resource::Present(db) = &self.database {
            db.close().await;
        }
        if let Resource::Present(cache) = &self.cache {
            cache.close();
        }
        tracing::info!("Resources closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ResourceContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceContainer")
            .field("database", &self.database)
            .field("cache", &self.cache)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapSource;

    #[tokio::test]
    async fn default_config_builds_without_optional_resources() {
        let container = ResourceContainer::build(AppConfig::default(), Arc::new(MapSource::new()))
            .await
            .unwrap();
        assert!(!container.database().is_present());
        assert_eq!(container.cache().absence(), Some(&AbsenceReason::NotConfigured));

        let err = container.database().require("database").unwrap_err();
        assert_eq!(err.to_string(), "database is not configured");
    }

    #[tokio::test]
    async fn unsupported_driver_is_a_configuration_error() {
        let mut config = AppConfig::default();
        config.database.driver = "sqlserver".into();
        config.database.host = "db".into();
        let err = ResourceContainer::build(config, Arc::new(MapSource::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedDriver(_)));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let container = ResourceContainer::build(AppConfig::default(), Arc::new(MapSource::new()))
            .await
            .unwrap();
        container.close().await;
        container.close().await;
        assert!(container.is_closed());
    }

    #[tokio::test]
    async fn source_is_exposed_for_custom_keys() {
        let source = MapSource::new().with("APP_ENV", "staging");
        let container = ResourceContainer::build(AppConfig::default(), Arc::new(source))
            .await
            .unwrap();
        assert_eq!(container.source().get_string("APP_ENV", "dev"), "staging");
    }
}
