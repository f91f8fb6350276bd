//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)            environment / in-memory map
//!     → loader.rs (parse)           → source.rs (typed get with defaults)
//!                 ↘                ↙
//!              validation.rs (semantic checks)
//!                       → AppConfig (validated, immutable)
//!                       → shared via Arc through the ResourceContainer
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod source;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AppConfig, CacheConfig, DatabaseConfig, HttpConfig, LoggingConfig, MetricsConfig, RunMode,
    ShutdownConfig, TlsConfig,
};
pub use source::{ConfigSource, EnvSource, MapSource};
pub use validation::{validate_config, ValidationError};
