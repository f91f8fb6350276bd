//! Scripted components for lifecycle unit tests.
//!
//! Same shape as the one in `tests/common`, which cannot reach
//! `#[cfg(test)]` items of the library.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::ComponentError;
use crate::lifecycle::component::{Component, ComponentState, ShutdownStatus};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Script {
    /// Serve until shut down.
    UntilStopped,
    /// Return from start on its own after the delay.
    ExitAfter(Duration),
    /// Fail start immediately.
    FailStart,
}

pub(crate) struct ScriptedComponent {
    name: String,
    script: Script,
    /// Shutdown blocks this long, ignoring its deadline.
    stop_delay: Duration,
    state: watch::Sender<ComponentState>,
    stop: watch::Sender<bool>,
    shutdown_calls: AtomicUsize,
    first_shutdown_at: Mutex<Option<Instant>>,
}

impl ScriptedComponent {
    pub(crate) fn new(name: &str, script: Script) -> Arc<Self> {
        Self::with_stop_delay(name, script, Duration::ZERO)
    }

    pub(crate) fn with_stop_delay(name: &str, script: Script, stop_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script,
            stop_delay,
            state: watch::channel(ComponentState::Idle).0,
            stop: watch::channel(false).0,
            shutdown_calls: AtomicUsize::new(0),
            first_shutdown_at: Mutex::new(None),
        })
    }

    pub(crate) fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn first_shutdown_at(&self) -> Option<Instant> {
        *self.first_shutdown_at.lock().unwrap()
    }

    pub(crate) async fn running(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == ComponentState::Running).await;
    }
}

#[async_trait]
impl Component for ScriptedComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ComponentState {
        *self.state.borrow()
    }

    async fn start(&self) -> Result<(), ComponentError> {
        match self.script {
            Script::FailStart => {
                self.state.send_replace(ComponentState::Failed);
                return Err(ComponentError::Serve("scripted start failure".into()));
            }
            Script::UntilStopped => {
                self.state.send_replace(ComponentState::Running);
                let mut rx = self.stop.subscribe();
                let _ = rx.wait_for(|stop| *stop).await;
            }
            Script::ExitAfter(after) => {
                self.state.send_replace(ComponentState::Running);
                tokio::time::sleep(after).await;
            }
        }
        self.state.send_replace(ComponentState::Stopped);
        Ok(())
    }

    async fn shutdown(&self, _deadline: Instant) -> Result<ShutdownStatus, ComponentError> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        self.first_shutdown_at
            .lock()
            .unwrap()
            .get_or_insert_with(Instant::now);
        tokio::time::sleep(self.stop_delay).await;
        self.stop.send_replace(true);
        Ok(ShutdownStatus::Clean)
    }
}
