use cartwright_core_types::{CoreError, JobId};
use cartwright_job_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job store: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transition(#[from] CoreError),
    #[error("job {0} is already running")]
    AlreadyRunning(JobId),
    #[error("job {0} not found")]
    UnknownJob(JobId),
    #[error("job {job_id} is {status}, expected pending")]
    NotPending { job_id: JobId, status: String },
    #[error("job task aborted: {0}")]
    Aborted(String),
}
