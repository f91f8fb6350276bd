//! A real SIGTERM delivered to this test process.
//!
//! Kept in its own test binary: signal handlers are process-wide.

#![cfg(unix)]

use std::time::Duration;

use apphost::lifecycle::StopReason;
use apphost::ShutdownStatus;
use tokio::time::Instant;

mod common;
use common::{spawn_app, test_app, test_config, Script, ScriptedComponent};

#[tokio::test]
async fn sigterm_stops_every_component() {
    let mut config = test_config(5);
    config.shutdown.handle_signals = true;
    config.shutdown.force_exit_on_repeat = false;

    let mut app = test_app(config).await;
    app.get("/ping", || async { "pong" }).unwrap();
    let worker = ScriptedComponent::new("worker", Script::UntilStopped);
    app.register_component("worker", worker.clone());

    let running = spawn_app(app).await;
    worker.running().await;
    let pong = reqwest::get(format!("http://{}/ping", running.addr.unwrap()))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(pong, "pong");

    let sent = Instant::now();
    let status = std::process::Command::new("kill")
        .arg("-TERM")
        .arg(std::process::id().to_string())
        .status()
        .expect("kill should run");
    assert!(status.success());

    let summary = tokio::time::timeout(Duration::from_secs(5), running.run)
        .await
        .expect("run should return after SIGTERM")
        .unwrap();

    let delivered = worker.first_shutdown_at().expect("worker should be shut down");
    assert!(delivered - sent < Duration::from_secs(2));
    assert_eq!(summary.reason, StopReason::Signal("SIGTERM"));
    assert_eq!(summary.shutdown.components.len(), 2);
    assert_eq!(summary.shutdown.outcome("http"), Some(&Ok(ShutdownStatus::Clean)));
    assert_eq!(summary.shutdown.outcome("worker"), Some(&Ok(ShutdownStatus::Clean)));
    assert!(summary.is_clean());
}
