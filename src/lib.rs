//! Application host: lifecycle orchestration with graceful shutdown.
//!
//! An [`App`] owns a [`ResourceContainer`](resources::ResourceContainer)
//! (config, optional database, optional cache), a registry of runnable
//! components (the HTTP server, the job scheduler, and any custom ones),
//! and a one-shot shutdown latch fed by SIGINT/SIGTERM or a
//! [`ShutdownHandle`](lifecycle::ShutdownHandle).

// Configuration and shared state
pub mod config;
pub mod resources;

// Components
pub mod http;
pub mod net;
pub mod scheduler;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;

pub mod app;

pub use app::{App, RunSummary};
pub use config::{AppConfig, ConfigSource};
pub use error::{AppError, ComponentError};
pub use lifecycle::{Component, ComponentState, ShutdownHandle, ShutdownStatus};
pub use scheduler::JobContext;
