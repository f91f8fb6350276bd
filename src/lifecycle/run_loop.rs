//! Concurrent run loop.
//!
//! # Responsibilities
//! - Start every registered component on its own task (fan-out)
//! - Wait until every one of those tasks has exited (fan-in)
//! - Record each exit, so one failure never hides or stops the others
//!
//! # Design Decisions
//! - `wait` is cancel-safe: exits are recorded as they arrive, so the App can
//!   race it against a stop request and resume it afterwards
//! - Panics inside `start` are caught and reported as component failures
//! - Aborting is a last resort after the shutdown deadline; aborted tasks are
//!   still awaited so the fan-in barrier holds

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::error::{ComponentError, ComponentFailure, Phase};
use crate::lifecycle::component::Component;
use crate::lifecycle::panic_message;
use crate::lifecycle::registry::ComponentRegistry;
use crate::observability::metrics;

/// How one component's `start` ended.
#[derive(Debug, Clone)]
pub struct ComponentExit {
    pub component: String,
    pub result: Result<(), ComponentError>,
    /// Time from launch to exit.
    pub elapsed: Duration,
}

/// Every component's exit, in registration order.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub exits: Vec<ComponentExit>,
}

impl RunReport {
    pub fn all_ok(&self) -> bool {
        self.exits.iter().all(|exit| exit.result.is_ok())
    }

    pub fn exit(&self, component: &str) -> Option<&ComponentExit> {
        self.exits.iter().find(|exit| exit.component == component)
    }

    pub fn failures(&self) -> Vec<ComponentFailure> {
        self.exits
            .iter()
            .filter_map(|exit| {
                exit.result.as_ref().err().map(|error| ComponentFailure {
                    component: exit.component.clone(),
                    phase: Phase::Start,
                    error: error.clone(),
                })
            })
            .collect()
    }
}

type Exit = (usize, Result<(), ComponentError>, Duration);

/// A set of launched components and the exits collected so far.
pub struct RunLoop {
    tasks: JoinSet<Exit>,
    names: Vec<String>,
    exits: Vec<Option<(Result<(), ComponentError>, Duration)>>,
}

impl RunLoop {
    /// Spawn `start` for every component. Returns immediately.
    pub fn launch(components: &[(String, Arc<dyn Component>)]) -> Self {
        let mut tasks = JoinSet::new();
        let launched_at = Instant::now();

        for (index, (id, component)) in components.iter().enumerate() {
            let id = id.clone();
            let component = Arc::clone(component);
            tasks.spawn(async move {
                tracing::info!(component = %id, phase = "start", "Component starting");
                metrics::record_component_start(&id);

                let result = match AssertUnwindSafe(component.start()).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(ComponentError::Panicked(panic_message(panic.as_ref()))),
                };

                match &result {
                    Ok(()) => tracing::info!(component = %id, phase = "start", "Component exited"),
                    Err(e) => tracing::error!(component = %id, phase = "start", error = %e, "Component failed"),
                }
                metrics::record_component_exit(&id, result.is_ok());
                (index, result, launched_at.elapsed())
            });
        }

        Self {
            tasks,
            names: components.iter().map(|(id, _)| id.clone()).collect(),
            exits: vec![None; components.len()],
        }
    }

    /// Wait until every launched task has exited. Cancel-safe.
    pub async fn wait(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((index, result, elapsed)) => self.exits[index] = Some((result, elapsed)),
                Err(e) if e.is_cancelled() => {}
                Err(e) => tracing::error!(error = %e, "Component task failed to join"),
            }
        }
    }

    /// Tasks that have not exited yet.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel every task that is still running. Follow with `wait`.
    pub fn abort_remaining(&mut self) {
        for (name, exit) in self.names.iter().zip(&self.exits) {
            if exit.is_none() {
                tracing::warn!(component = %name, "Aborting component that outlived the shutdown deadline");
            }
        }
        self.tasks.abort_all();
    }

    /// Components without a recorded exit are reported as aborted.
    pub fn into_report(self) -> RunReport {
        let exits = self
            .names
            .into_iter()
            .zip(self.exits)
            .map(|(component, exit)| match exit {
                Some((result, elapsed)) => ComponentExit {
                    component,
                    result,
                    elapsed,
                },
                None => ComponentExit {
                    component,
                    result: Err(ComponentError::Aborted),
                    elapsed: Duration::ZERO,
                },
            })
            .collect();
        RunReport { exits }
    }
}

/// Start every registered component and block until all have exited.
pub async fn run_all(registry: &ComponentRegistry) -> RunReport {
    let mut run_loop = RunLoop::launch(registry.entries());
    run_loop.wait().await;
    run_loop.into_report()
}
