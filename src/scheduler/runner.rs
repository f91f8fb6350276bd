//! The scheduler as a lifecycle component.
//!
//! # Responsibilities
//! - Hold registered jobs until start
//! - Sleep until the earliest due job, fire it on its own task, repeat
//! - Record every run's outcome per job
//! - On shutdown: stop firing, drain runs until the deadline, abandon the rest
//!
//! # Design Decisions
//! - Runs are independent tasks: a slow or failing run never delays another
//! - Abandoned runs are detached, not cancelled; they may still finish later
//! - Abandonment is a partial shutdown, not a failure

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::FutureExt;
use tokio::sync::{watch, OnceCell};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::Instrument;

use crate::config::ConfigError;
use crate::error::ComponentError;
use crate::http::SharedResources;
use crate::lifecycle::{panic_message, Component, ComponentState, ShutdownStatus};
use crate::observability::metrics;
use crate::scheduler::job::{Job, JobContext, JobCounters, JobStats, JobTask};
use crate::scheduler::schedule::Schedule;

/// Time allowed past the deadline for the dispatch loop to report back.
const REPORT_SLACK: Duration = Duration::from_millis(100);

pub struct SchedulerComponent {
    name: String,
    resources: SharedResources,
    /// `None` once taken by `start`.
    jobs: Mutex<Option<Vec<Job>>>,
    stats: Mutex<Vec<(Arc<str>, Arc<JobCounters>)>>,
    state: watch::Sender<ComponentState>,
    /// Set once: the deadline in-flight runs may use.
    stop: watch::Sender<Option<Instant>>,
    /// Set once by the dispatch loop: how many runs were abandoned.
    done: watch::Sender<Option<usize>>,
    outcome: OnceCell<Result<ShutdownStatus, ComponentError>>,
}

impl SchedulerComponent {
    pub fn new(name: impl Into<String>, resources: SharedResources) -> Self {
        Self {
            name: name.into(),
            resources,
            jobs: Mutex::new(Some(Vec::new())),
            stats: Mutex::new(Vec::new()),
            state: watch::channel(ComponentState::Idle).0,
            stop: watch::channel(None).0,
            done: watch::channel(None).0,
            outcome: OnceCell::new(),
        }
    }

    /// Register `task` to run on `schedule` (see [`Schedule`] for the syntax).
    pub fn add_job(&self, name: &str, schedule: &str, task: JobTask) -> Result<(), ConfigError> {
        let schedule = schedule.parse::<Schedule>()?;
        self.add_scheduled_job(name, schedule, task)
    }

    pub fn add_scheduled_job(&self, name: &str, schedule: Schedule, task: JobTask) -> Result<(), ConfigError> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(jobs) = jobs.as_mut() else {
            return Err(ConfigError::AlreadyRunning(self.name.clone()));
        };

        tracing::debug!(job = %name, schedule = %schedule, "Job registered");
        let job = Job::new(name, schedule, task);
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((job.name.clone(), job.counters.clone()));
        jobs.push(job);
        Ok(())
    }

    pub fn job_count(&self) -> usize {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Statistics for every job, in registration order.
    pub fn job_stats(&self) -> Vec<(String, JobStats)> {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, counters)| (name.to_string(), counters.snapshot()))
            .collect()
    }

    /// Statistics for the first job registered under `name`.
    pub fn stats(&self, name: &str) -> Option<JobStats> {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(job, _)| job.as_ref() == name)
            .map(|(_, counters)| counters.snapshot())
    }

    fn launch(&self, runs: &mut JoinSet<()>, job: &Job, scheduled_at: chrono::DateTime<Utc>) {
        let ctx = JobContext::new(self.resources.clone(), job.name.clone(), scheduled_at);
        let span = tracing::info_span!("job", job = %job.name, run_id = %ctx.run_id());
        let task = job.task.clone();
        let counters = job.counters.clone();
        let name = job.name.clone();

        runs.spawn(
            async move {
                let started = Instant::now();
                let result = AssertUnwindSafe(async move { task(ctx).await })
                    .catch_unwind()
                    .await;
                let elapsed = started.elapsed();

                let outcome = match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(format!("{:#}", e)),
                    Err(panic) => Err(format!("panicked: {}", panic_message(panic.as_ref()))),
                };
                match &outcome {
                    Ok(()) => tracing::debug!(elapsed = ?elapsed, "Job run finished"),
                    Err(e) => tracing::error!(elapsed = ?elapsed, error = %e, "Job run failed"),
                }
                counters.record(scheduled_at, &outcome);
                metrics::record_job_run(&name, outcome.is_ok(), elapsed);
            }
            .instrument(span),
        );
    }

    /// Fire jobs until a stop is requested, then drain. Returns the number
    /// of runs abandoned at the deadline.
    async fn dispatch(&self, mut jobs: Vec<Job>) -> usize {
        let mut runs = JoinSet::new();
        let mut stop = self.stop.subscribe();

        let now = Utc::now();
        for job in jobs.iter_mut() {
            job.next = job.schedule.next_after(now);
        }

        let deadline = loop {
            if let Some(deadline) = *stop.borrow_and_update() {
                break deadline;
            }

            let now = Utc::now();
            let wait = jobs
                .iter()
                .filter_map(|job| job.next)
                .min()
                .map(|due| (due - now).to_std().unwrap_or(Duration::ZERO));

            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() {
                        break Instant::now();
                    }
                }
                _ = sleep_or_forever(wait) => {
                    let now = Utc::now();
                    for job in jobs.iter_mut() {
                        if let Some(due) = job.next.filter(|due| *due <= now) {
                            self.launch(&mut runs, job, due);
                            job.next = job.schedule.next_after(now);
                        }
                    }
                }
                Some(_) = runs.join_next(), if !runs.is_empty() => {}
            }
        };

        while runs.try_join_next().is_some() {}
        tracing::info!(
            component = %self.name,
            in_flight = runs.len(),
            "Scheduler stopped dispatching"
        );

        let drained = tokio::time::timeout_at(deadline, async {
            while runs.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        if drained {
            return 0;
        }
        while runs.try_join_next().is_some() {}
        let abandoned = runs.len();
        runs.detach_all();
        abandoned
    }

    async fn stop(&self, deadline: Instant) -> Result<ShutdownStatus, ComponentError> {
        let mut prior = ComponentState::Idle;
        self.state.send_if_modified(|s| {
            prior = *s;
            match *s {
                ComponentState::Idle => {
                    *s = ComponentState::Stopped;
                    true
                }
                ComponentState::Starting | ComponentState::Running => {
                    *s = ComponentState::Stopping;
                    true
                }
                _ => false,
            }
        });

        match prior {
            ComponentState::Idle => {
                tracing::debug!(component = %self.name, "Shutdown before start");
                return Ok(ShutdownStatus::Clean);
            }
            ComponentState::Stopped | ComponentState::Failed => return Ok(ShutdownStatus::Clean),
            _ => {}
        }

        self.stop.send_replace(Some(deadline));

        let mut done = self.done.subscribe();
        let abandoned = match tokio::time::timeout_at(deadline + REPORT_SLACK, done.wait_for(Option::is_some)).await {
            Ok(Ok(report)) => (*report).unwrap_or(0),
            _ => return Err(ComponentError::DeadlineExceeded),
        };

        if abandoned == 0 {
            return Ok(ShutdownStatus::Clean);
        }
        tracing::warn!(component = %self.name, abandoned, "Job runs still in flight at the deadline were abandoned");
        metrics::record_jobs_abandoned(abandoned);
        Ok(ShutdownStatus::Partial(format!("abandoned {} job run(s)", abandoned)))
    }
}

async fn sleep_or_forever(wait: Option<Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending().await,
    }
}

#[async_trait]
impl Component for SchedulerComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ComponentState {
        *self.state.borrow()
    }

    async fn start(&self) -> Result<(), ComponentError> {
        let entered = self.state.send_if_modified(|s| {
            if *s == ComponentState::Idle {
                *s = ComponentState::Running;
                return true;
            }
            false
        });
        if !entered {
            return match self.state() {
                ComponentState::Stopped => Ok(()),
                _ => Err(ComponentError::AlreadyStarted),
            };
        }

        let jobs = self
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_default();
        tracing::info!(component = %self.name, jobs = jobs.len(), "Scheduler started");

        let abandoned = self.dispatch(jobs).await;
        self.done.send_replace(Some(abandoned));
        self.state.send_replace(ComponentState::Stopped);
        Ok(())
    }

    async fn shutdown(&self, deadline: Instant) -> Result<ShutdownStatus, ComponentError> {
        self.outcome
            .get_or_init(|| self.stop(deadline))
            .await
            .clone()
    }
}

impl std::fmt::Debug for SchedulerComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerComponent")
            .field("name", &self.name)
            .field("jobs", &self.job_count())
            .field("state", &self.state())
            .finish()
    }
}
