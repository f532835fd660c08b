//! Error taxonomy for the download pipeline
//!
//! Per-job and per-season failures are caught at the worker boundary and turned
//! into a terminal `error` state; only [`EngineError::InterruptedWait`] is allowed
//! to tear down the calling loop.

use thiserror::Error;

use crate::jobs::state::JobState;

/// Errors raised by the retry engine, the job handlers and the collaborator clients.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or missing job metadata, or an unparseable folder/season name.
    #[error("incorrect working reference: {0}")]
    IncorrectWorkingReference(String),

    /// A lookup against a collaborator returned nothing.
    #[error("no element found: {0}")]
    NoElementFound(String),

    /// A bounded retry loop exhausted its attempt budget.
    #[error("too many retries ({attempts} attempts)")]
    TooManyRetries { attempts: u32 },

    /// A wait was interrupted. Fatal to the current unit of work and its caller.
    #[error("unexpected interruption while waiting")]
    InterruptedWait,

    #[error("job {job}: invalid state transition {from} -> {to}")]
    InvalidTransition {
        job: String,
        from: String,
        to: JobState,
    },

    /// A collaborator API answered with a non-success status.
    #[error("{service} API returned status {status}: {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EngineError {
    /// Whether this error must propagate instead of being absorbed per job.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::InterruptedWait)
    }
}
