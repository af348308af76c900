use std::path::PathBuf;

use cartwright_core_types::{CoreError, JobId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store file {path} unreadable: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not encode store: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("job {0} not found")]
    UnknownJob(JobId),
    #[error(transparent)]
    Transition(#[from] CoreError),
}
