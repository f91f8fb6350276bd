//! Shutdown coordination.
//!
//! [`ShutdownHandle`] is the one-shot "stop requested" latch shared by the
//! signal listener, programmatic callers and the App. [`ShutdownCoordinator`]
//! turns a request into concurrent, deadline-bounded `shutdown` calls and an
//! aggregated [`ShutdownReport`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{watch, OnceCell};
use tokio::time::Instant;

use crate::error::{ComponentError, ComponentFailure, Phase};
use crate::lifecycle::component::{Component, ShutdownStatus};
use crate::lifecycle::registry::ComponentRegistry;
use crate::observability::metrics;

/// Slack granted past the deadline for a component to report back before the
/// coordinator gives up on it.
pub const SHUTDOWN_OVERHEAD: Duration = Duration::from_millis(250);

/// Why the App is stopping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// A termination signal was delivered.
    Signal(&'static str),
    /// A caller asked through a [`ShutdownHandle`].
    Requested,
    /// Every component exited on its own.
    Completed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Signal(name) => write!(f, "signal {}", name),
            StopReason::Requested => write!(f, "requested"),
            StopReason::Completed => write!(f, "all components exited"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StopRequest {
    pub reason: StopReason,
    pub deadline: Instant,
}

struct HandleInner {
    ceiling: Duration,
    request: watch::Sender<Option<StopRequest>>,
    report: watch::Sender<Option<ShutdownReport>>,
}

/// Cloneable trigger for a one-time shutdown.
///
/// The first request wins; later ones are ignored, so a second signal or a
/// racing caller can never start a second shutdown.
#[derive(Clone)]
pub struct ShutdownHandle {
    inner: Arc<HandleInner>,
}

impl ShutdownHandle {
    /// `ceiling` is the fixed budget used by [`trigger`](Self::trigger).
    pub fn new(ceiling: Duration) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                ceiling,
                request: watch::channel(None).0,
                report: watch::channel(None).0,
            }),
        }
    }

    pub fn ceiling(&self) -> Duration {
        self.inner.ceiling
    }

    /// Request shutdown with a fresh deadline of `now + ceiling`.
    /// Returns `true` if this call initiated the shutdown.
    pub fn trigger(&self, reason: StopReason) -> bool {
        self.request_with(reason, Instant::now() + self.inner.ceiling)
    }

    /// Request shutdown, giving components `within` to stop.
    pub fn request(&self, within: Duration) -> bool {
        self.request_with(StopReason::Requested, Instant::now() + within)
    }

    fn request_with(&self, reason: StopReason, deadline: Instant) -> bool {
        let initiated = self.inner.request.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(StopRequest {
                reason: reason.clone(),
                deadline,
            });
            true
        });
        if initiated {
            tracing::info!(reason = %reason, "Shutdown requested");
        } else {
            tracing::debug!(reason = %reason, "Shutdown already in progress");
        }
        initiated
    }

    pub fn is_requested(&self) -> bool {
        self.inner.request.borrow().is_some()
    }

    /// Resolves once a stop has been requested.
    pub async fn requested(&self) -> StopRequest {
        let mut rx = self.inner.request.subscribe();
        if let Ok(current) = rx.wait_for(Option::is_some).await {
            if let Some(request) = current.as_ref() {
                return request.clone();
            }
        }
        std::future::pending().await
    }

    /// Request shutdown and wait for the running App to report the outcome.
    pub async fn shutdown(&self, within: Duration) -> ShutdownReport {
        self.request(within);
        self.report().await
    }

    /// Resolves with the report once the App has finished shutting down.
    pub async fn report(&self) -> ShutdownReport {
        let mut rx = self.inner.report.subscribe();
        if let Ok(current) = rx.wait_for(Option::is_some).await {
            if let Some(report) = current.as_ref() {
                return report.clone();
            }
        }
        std::future::pending().await
    }

    pub(crate) fn publish(&self, report: ShutdownReport) {
        self.inner.report.send_replace(Some(report));
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("ceiling", &self.inner.ceiling)
            .field("requested", &self.is_requested())
            .finish()
    }
}

/// One component's shutdown result.
#[derive(Debug, Clone)]
pub struct ComponentShutdown {
    pub component: String,
    pub outcome: Result<ShutdownStatus, ComponentError>,
    pub elapsed: Duration,
}

/// Aggregated shutdown outcome, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub components: Vec<ComponentShutdown>,
    pub elapsed: Duration,
}

impl ShutdownReport {
    /// Every component stopped cleanly.
    pub fn is_clean(&self) -> bool {
        self.components
            .iter()
            .all(|c| matches!(c.outcome, Ok(ShutdownStatus::Clean)))
    }

    pub fn has_failures(&self) -> bool {
        self.components.iter().any(|c| c.outcome.is_err())
    }

    pub fn outcome(&self, component: &str) -> Option<&Result<ShutdownStatus, ComponentError>> {
        self.components
            .iter()
            .find(|c| c.component == component)
            .map(|c| &c.outcome)
    }

    pub fn failures(&self) -> Vec<ComponentFailure> {
        self.components
            .iter()
            .filter_map(|c| {
                c.outcome.as_ref().err().map(|error| ComponentFailure {
                    component: c.component.clone(),
                    phase: Phase::Shutdown,
                    error: error.clone(),
                })
            })
            .collect()
    }

    /// Components that stopped but left work behind, with the detail.
    pub fn partials(&self) -> Vec<(&str, &str)> {
        self.components
            .iter()
            .filter_map(|c| match &c.outcome {
                Ok(ShutdownStatus::Partial(detail)) => Some((c.component.as_str(), detail.as_str())),
                _ => None,
            })
            .collect()
    }
}

/// Drives `shutdown` on every component concurrently, once.
pub struct ShutdownCoordinator {
    components: Vec<(String, Arc<dyn Component>)>,
    report: OnceCell<ShutdownReport>,
}

impl ShutdownCoordinator {
    pub fn new(registry: &ComponentRegistry) -> Self {
        Self {
            components: registry.entries().to_vec(),
            report: OnceCell::new(),
        }
    }

    /// Shut every component down by `deadline`.
    ///
    /// Returns once every component has answered or overrun the deadline by
    /// [`SHUTDOWN_OVERHEAD`]. Repeated calls return the first report.
    pub async fn shutdown(&self, deadline: Instant) -> ShutdownReport {
        self.report
            .get_or_init(|| self.shutdown_all(deadline))
            .await
            .clone()
    }

    async fn shutdown_all(&self, deadline: Instant) -> ShutdownReport {
        let started = Instant::now();
        tracing::info!(
            components = self.components.len(),
            budget = ?deadline.saturating_duration_since(started),
            "Shutting down components"
        );

        let calls = self.components.iter().map(|(id, component)| async move {
            let begin = Instant::now();
            tracing::info!(component = %id, phase = "shutdown", "Stopping component");

            let outcome = match tokio::time::timeout_at(deadline + SHUTDOWN_OVERHEAD, component.shutdown(deadline)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ComponentError::DeadlineExceeded),
            };
            let elapsed = begin.elapsed();

            let label = match &outcome {
                Ok(ShutdownStatus::Clean) => {
                    tracing::info!(component = %id, phase = "shutdown", elapsed = ?elapsed, "Component stopped");
                    "clean"
                }
                Ok(ShutdownStatus::Partial(detail)) => {
                    tracing::warn!(component = %id, phase = "shutdown", elapsed = ?elapsed, detail = %detail, "Component stopped with work left behind");
                    "partial"
                }
                Err(e) => {
                    tracing::error!(component = %id, phase = "shutdown", elapsed = ?elapsed, error = %e, "Component failed to stop");
                    "error"
                }
            };
            metrics::record_shutdown(id, label, elapsed);

            ComponentShutdown {
                component: id.clone(),
                outcome,
                elapsed,
            }
        });

        let report = ShutdownReport {
            components: join_all(calls).await,
            elapsed: started.elapsed(),
        };

        if report.has_failures() {
            tracing::warn!(elapsed = ?report.elapsed, "Shutdown completed with errors");
        } else {
            tracing::info!(elapsed = ?report.elapsed, "Shutdown completed");
        }
        report
    }
}
