//! Job scheduling subsystem.
//!
//! # Data Flow
//! ```text
//! add_job(name, "*/5 * * * *", task)
//!     → schedule.rs (parse; invalid → ConfigError at registration)
//!     → runner.rs (queued until start)
//! start
//!     → sleep until the earliest due job → spawn run with a fresh JobContext
//!     → job.rs (per-job runs / failures / last error)
//! shutdown(deadline)
//!     → stop firing → drain until deadline → abandon the rest (Partial)
//! ```

pub mod job;
pub mod runner;
pub mod schedule;

pub use job::{job_task, JobContext, JobStats, JobTask};
pub use runner::SchedulerComponent;
pub use schedule::Schedule;
