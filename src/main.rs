//! apphost: a minimal service on top of the application host.
//!
//! # Architecture Overview
//!
//! ```text
//!   config (TOML file or environment)
//!         │
//!         ▼
//!   ┌──────────────────── App ────────────────────┐
//!   │ ResourceContainer: config, database?, cache? │
//!   │                                              │
//!   │   ┌──────────┐   ┌────────────┐   ┌──────┐   │
//!   │   │   http   │   │ scheduler  │   │ ...  │   │  RunLoop (fan-out / fan-in)
//!   │   │  /ping   │   │ heartbeat  │   │      │   │
//!   │   └──────────┘   └────────────┘   └──────┘   │
//!   │         ▲               ▲             ▲      │
//!   │         └─── shutdown(deadline) ──────┘      │  ShutdownCoordinator
//!   └──────────────────────▲───────────────────────┘
//!                          │
//!                 SIGINT / SIGTERM
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::Json;
use clap::Parser;
use serde_json::{json, Value};

use apphost::config::{load_config, AppConfig, ConfigSource, EnvSource};
use apphost::http::SharedResources;
use apphost::observability::{init_logging, init_metrics};
use apphost::scheduler::Schedule;
use apphost::{App, JobContext};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "apphost", version, about = "Run an HTTP server and a job scheduler until told to stop")]
struct Cli {
    /// TOML configuration file. Without it, configuration is read from the environment.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("apphost: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let source: Arc<dyn ConfigSource> = Arc::new(EnvSource);
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::from_source(source.as_ref())?,
    };

    init_logging(&config.logging)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "apphost starting");

    if config.metrics.enabled {
        match config.metrics.address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.metrics.address,
                "Failed to parse metrics address"
            ),
        }
    }

    tracing::info!(
        bind_address = %config.http.bind_address(),
        mode = %config.http.mode,
        shutdown_timeout_secs = config.shutdown.timeout_secs,
        "Configuration loaded"
    );

    let mut app = App::new(config, source).await?;
    app.get("/ping", ping)?;
    app.add_scheduled_job("heartbeat", Schedule::every(HEARTBEAT_INTERVAL)?, heartbeat)?;

    let summary = app.run().await;
    if summary.is_clean() {
        return Ok(ExitCode::SUCCESS);
    }
    for failure in summary.failures() {
        tracing::error!(component = %failure.component, phase = %failure.phase, error = %failure.error, "Component failure");
    }
    Ok(ExitCode::FAILURE)
}

async fn ping(State(resources): State<SharedResources>) -> Json<Value> {
    Json(json!({
        "message": "pong",
        "mode": resources.config().http.mode.to_string(),
        "database": resources.database().is_present(),
        "cache": resources.cache().is_present(),
    }))
}

async fn heartbeat(ctx: JobContext) -> anyhow::Result<()> {
    if let Some(db) = ctx.resources().database().present() {
        db.ping().await?;
    }
    if let Some(cache) = ctx.resources().cache().present() {
        cache.ping().await?;
    }
    tracing::info!(run_id = %ctx.run_id(), "Heartbeat");
    Ok(())
}
