//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use apphost::config::{AppConfig, MapSource};
use apphost::{App, Component, ComponentError, ComponentState, RunSummary, ShutdownHandle, ShutdownStatus};
use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Loopback server on an ephemeral port, signals left to the test.
pub fn test_config(shutdown_timeout_secs: u64) -> AppConfig {
    let mut config = AppConfig::default();
    config.http.host = "127.0.0.1".into();
    config.http.port = 0;
    config.shutdown.timeout_secs = shutdown_timeout_secs;
    config.shutdown.handle_signals = false;
    config
}

pub async fn test_app(config: AppConfig) -> App {
    App::new(config, Arc::new(MapSource::new()))
        .await
        .expect("test config should build")
}

/// A running App and what tests need to poke at it.
pub struct RunningApp {
    pub handle: ShutdownHandle,
    pub addr: Option<SocketAddr>,
    pub run: JoinHandle<RunSummary>,
}

/// Spawn `app.run()` and wait for the HTTP server, if any, to listen.
pub async fn spawn_app(app: App) -> RunningApp {
    let handle = app.shutdown_handle();
    let server = app.server().cloned();
    let run = tokio::spawn(app.run());
    let addr = match server {
        Some(server) => Some(server.serving().await.expect("server should start")),
        None => None,
    };
    RunningApp { handle, addr, run }
}

#[derive(Debug, Clone, Copy)]
pub enum Script {
    /// Serve until shut down.
    UntilStopped,
    /// Return from start on its own after the delay.
    ExitAfter(Duration),
    /// Fail start immediately.
    FailStart,
}

/// A component whose start and shutdown follow a script.
pub struct ScriptedComponent {
    name: String,
    script: Script,
    /// Shutdown blocks this long, ignoring its deadline.
    stop_delay: Duration,
    state: watch::Sender<ComponentState>,
    stop: watch::Sender<bool>,
    shutdown_calls: AtomicUsize,
    first_shutdown_at: std::sync::Mutex<Option<Instant>>,
}

impl ScriptedComponent {
    pub fn new(name: &str, script: Script) -> Arc<Self> {
        Self::with_stop_delay(name, script, Duration::ZERO)
    }

    pub fn with_stop_delay(name: &str, script: Script, stop_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script,
            stop_delay,
            state: watch::channel(ComponentState::Idle).0,
            stop: watch::channel(false).0,
            shutdown_calls: AtomicUsize::new(0),
            first_shutdown_at: std::sync::Mutex::new(None),
        })
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }

    pub fn first_shutdown_at(&self) -> Option<Instant> {
        *self.first_shutdown_at.lock().unwrap()
    }

    pub async fn running(&self) {
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
