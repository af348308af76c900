use std::path::PathBuf;

use cdp_adapter::{AdapterError, SessionStateError};
use stealth::StealthError;
use thiserror::Error;

/// Failures that stop a session from opening or persisting. Failures while
/// a session is driving the site are reported as `Outcome`s instead.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("browser unavailable: {0}")]
    Browser(#[from] AdapterError),
    #[error("session state: {0}")]
    State(#[from] SessionStateError),
    #[error("stealth setup failed: {0}")]
    Stealth(#[from] StealthError),
    #[error("i/o failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid selector table: {0}")]
    Config(String),
}
