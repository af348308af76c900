use std::path::PathBuf;

use cartwright_core_types::{ChatId, CoreError, JobId, JobStatus};
use cartwright_job_store::StoreError;
use cartwright_scheduler::SchedulerError;
use session_engine::SessionError;
use thiserror::Error;

use crate::llm::LlmError;

/// Errors surfaced by the control plane, the CLI and chat ingest. Job runs
/// never return these; the lifecycle folds every failure into the job record.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("i/o failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("stealth bundle: {0}")]
    Stealth(#[from] stealth::config::ConfigError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Transition(#[from] CoreError),

    #[error("chat {0} has no items")]
    NoItems(ChatId),

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("job {job_id} is {status}; only jobs waiting on the user can be resumed")]
    NotResumable { job_id: JobId, status: JobStatus },
}

impl CartError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

pub type CartResult<T> = Result<T, CartError>;
