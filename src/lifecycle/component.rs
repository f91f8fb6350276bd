//! The contract every runnable subsystem implements.

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::ComponentError;

/// Lifecycle state of a component.
///
/// ```text
/// Idle → Starting → Running → Stopping → Stopped
///            ↘         ↘
///             Failed    Failed
/// Idle → Stopped   (shutdown before start)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Idle,
    Starting,
    /// Serving connections, or dispatching jobs.
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl ComponentState {
    /// `Start` has returned or will return without doing work.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ComponentState::Stopped | ComponentState::Failed)
    }
}

impl std::fmt::Display for ComponentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ComponentState::Idle => "idle",
            ComponentState::Starting => "starting",
            ComponentState::Running => "running",
            ComponentState::Stopping => "stopping",
            ComponentState::Stopped => "stopped",
            ComponentState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a successful shutdown went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownStatus {
    /// Everything in flight finished in time (or there was nothing to stop).
    Clean,
    /// Stopped, but some work was cut off or left behind at the deadline.
    Partial(String),
}

/// A subsystem with a blocking `start` and a bounded `shutdown`.
///
/// Implementations must make `shutdown` a no-op success before `start`
/// and idempotent after it: repeated calls return the first outcome.
#[async_trait]
pub trait Component: Send + Sync {
    fn name(&self) -> &str;

    fn state(&self) -> ComponentState;

    /// Runs until stopped or failed. Must not be called twice.
    async fn start(&self) -> Result<(), ComponentError>;

    /// Stop, giving in-flight work until `deadline`.
    async fn shutdown(&self, deadline: Instant) -> Result<ShutdownStatus, ComponentError>;
}
