//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Configuration phase (registry.rs):
//!     route/job registration → component enabled → ComponentRegistry
//!
//! Run phase (run_loop.rs):
//!     RunLoop::launch → one task per component → wait (fan-in barrier)
//!
//! Stop (signals.rs, shutdown.rs):
//!     SIGTERM/SIGINT or ShutdownHandle → one StopRequest (deadline)
//!     → ShutdownCoordinator → shutdown(deadline) on all components concurrently
//!     → ShutdownReport (per-component outcomes, aggregated)
//! ```
//!
//! # Design Decisions
//! - No ordering between components: every shutdown is issued at once
//! - Shutdown has a hard ceiling: overrunning components are reported, not awaited
//! - One failure never aborts the start or shutdown of the others

pub mod component;
pub mod registry;
pub mod run_loop;
pub mod shutdown;
pub mod signals;

#[cfg(test)]
pub(crate) mod test_support;

pub use component::{Component, ComponentState, ShutdownStatus};
pub use registry::ComponentRegistry;
pub use run_loop::{run_all, ComponentExit, RunLoop, RunReport};
pub use shutdown::{
    ComponentShutdown, ShutdownCoordinator, ShutdownHandle, ShutdownReport, StopReason, StopRequest,
};
pub use signals::SignalListener;

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
