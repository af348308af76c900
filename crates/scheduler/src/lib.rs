//! Job dispatch for cartwright.
//!
//! The [`Scheduler`] polls the job store on a fixed interval and runs each
//! newly seen pending job as an independent task through a [`JobExecutor`].
//! The [`JobRegistry`] is an explicit, injectable object: it tracks which
//! jobs are in flight and delivers each run's [`JobReport`] to subscribers
//! exactly once.
//!
//! [`JobReport`]: cartwright_core_types::JobReport

pub mod error;
pub mod executor;
pub mod metrics;
pub mod registry;
pub mod scheduler;

pub use error::SchedulerError;
pub use executor::JobExecutor;
pub use metrics::SchedulerMetricsSnapshot;
pub use registry::{Claim, JobRegistry};
pub use scheduler::{Scheduler, SchedulerConfig};
