//! OS signal handling.
//!
//! # Responsibilities
//! - Subscribe to SIGINT/SIGTERM once, on a single dedicated task
//! - Translate the first signal into a shutdown request
//! - Optionally turn a second signal into an immediate exit
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers are registered synchronously in `install`, so a signal that
//!   arrives right after `install` returns is never missed
//! - The listener does not drive shutdown itself; it only flips the handle

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::{ShutdownHandle, StopReason};

/// Exit code used when a repeated signal forces the process down.
pub const FORCED_EXIT_CODE: i32 = 130;

/// The task owning the signal subscription. Dropping it stops listening.
pub struct SignalListener {
    task: JoinHandle<()>,
}

impl SignalListener {
    /// Register handlers and spawn the listening task.
    pub fn install(handle: ShutdownHandle, force_exit_on_repeat: bool) -> std::io::Result<Self> {
        let mut signals = Signals::register()?;
        let task = tokio::spawn(async move {
            let first = signals.recv().await;
            tracing::info!(signal = first, "Termination signal received");
            handle.trigger(StopReason::Signal(first));

            loop {
                let again = signals.recv().await;
                if force_exit_on_repeat {
                    tracing::warn!(signal = again, "Second termination signal received, forcing exit");
                    std::process::exit(FORCED_EXIT_CODE);
                }
                tracing::warn!(signal = again, "Termination signal received while already shutting down");
            }
        });
        tracing::debug!("Signal listener installed");
        Ok(Self { task })
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            Some(()) = self.interrupt.recv() => "SIGINT",
            Some(()) = self.terminate.recv() => "SIGTERM",
            else => std::future::pending().await,
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn register() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "CTRL_C",
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending().await
            }
        }
    }
}
