//! Crate error taxonomy.
//!
//! - [`ConfigError`]: registration/construction time, fail fast
//! - [`ComponentError`]: a component failed to start, serve or stop
//! - [`ResourceError`]: an optional resource failed an operation or is absent
//! - [`AppError`]: top-level, what `App` callers see

use thiserror::Error;

pub use crate::config::ConfigError;
pub use crate::resources::ResourceError;

/// Lifecycle phase a component failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Shutdown,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Start => write!(f, "start"),
            Phase::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// A component-level failure.
///
/// `Clone` so a cached shutdown outcome can be handed to every caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ComponentError {
    #[error("component was already started")]
    AlreadyStarted,

    #[error("failed to bind {address}: {reason}")]
    Bind { address: String, reason: String },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("server error: {0}")]
    Serve(String),

    #[error("component panicked: {0}")]
    Panicked(String),

    #[error("did not stop within the shutdown deadline")]
    DeadlineExceeded,

    #[error("aborted after the shutdown deadline")]
    Aborted,
}

impl ComponentError {
    /// Timeout-class failures: the component outlived its budget.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ComponentError::DeadlineExceeded | ComponentError::Aborted)
    }
}

/// A component failure tagged with where it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentFailure {
    pub component: String,
    pub phase: Phase,
    pub error: ComponentError,
}

impl std::fmt::Display for ComponentFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.component, self.phase, self.error)
    }
}

/// Top-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("completed with {} error(s): {}", .0.len(), join_failures(.0))]
    Run(Vec<ComponentFailure>),
}

fn join_failures(failures: &[ComponentFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
