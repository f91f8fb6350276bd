//! Jobs, their execution context and run statistics.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use uuid::Uuid;

use crate::http::SharedResources;
use crate::scheduler::schedule::Schedule;

/// Boxed job body. Errors are recorded, never propagated.
pub type JobTask = Arc<dyn Fn(JobContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Box a closure returning a future into a [`JobTask`].
pub fn job_task<F, Fut>(task: F) -> JobTask
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(task(ctx)))
}

/// Handed to every run: a fresh value per invocation.
#[derive(Clone)]
pub struct JobContext {
    resources: SharedResources,
    job: Arc<str>,
    run_id: Uuid,
    scheduled_at: DateTime<Utc>,
}

impl JobContext {
    pub(crate) fn new(resources: SharedResources, job: Arc<str>, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            resources,
            job,
            run_id: Uuid::new_v4(),
            scheduled_at,
        }
    }

    pub fn resources(&self) -> &SharedResources {
        &self.resources
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The tick this run was fired for, not when it actually began.
    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.scheduled_at
    }
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("job", &self.job)
            .field("run_id", &self.run_id)
            .field("scheduled_at", &self.scheduled_at)
            .finish()
    }
}

/// Point-in-time view of a job's history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStats {
    /// Completed runs, successful or not.
    pub runs: u64,
    pub failures: u64,
    pub last_error: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub(crate) struct JobCounters {
    runs: AtomicU64,
    failures: AtomicU64,
    last: Mutex<(Option<String>, Option<DateTime<Utc>>)>,
}

impl JobCounters {
    pub(crate) fn record(&self, scheduled_at: DateTime<Utc>, outcome: &Result<(), String>) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        last.1 = Some(scheduled_at);
        if let Err(e) = outcome {
            self.failures.fetch_add(1, Ordering::Relaxed);
            last.0 = Some(e.clone());
        }
        self.runs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> JobStats {
        let last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        JobStats {
            runs: self.runs.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            last_error: last.0.clone(),
            last_run_at: last.1,
        }
    }
}

/// A registered job and its dispatch bookkeeping.
pub(crate) struct Job {
    pub(crate) name: Arc<str>,
    pub(crate) schedule: Schedule,
    pub(crate) task: JobTask,
    pub(crate) counters: Arc<JobCounters>,
    pub(crate) next: Option<DateTime<Utc>>,
}

impl Job {
    pub(crate) fn new(name: &str, schedule: Schedule, task: JobTask) -> Self {
        Self {
            name: Arc::from(name),
            schedule,
            task,
            counters: Arc::new(JobCounters::default()),
            next: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_failures_and_last_error() {
        let counters = JobCounters::default();
        let at = Utc::now();
        counters.record(at, &Ok(()));
        counters.record(at, &Err("boom".into()));
        counters.record(at, &Ok(()));

        let stats = counters.snapshot();
        assert_eq!(stats.runs, 3);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.last_error.as_deref(), Some("boom"));
        assert_eq!(stats.last_run_at, Some(at));
    }
}
