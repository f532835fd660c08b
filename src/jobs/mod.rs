//! Download post-processing jobs
//!
//! The grabbed-downloads orchestrator and its per-job handler, the one-shot
//! failed-downloads pass, and the primitives they share (retry engine, job
//! marker files, state registry).

pub mod failed_downloads;
pub mod handler;
pub mod job_file;
pub mod orchestrator;
pub mod retry;
pub mod state;

use async_trait::async_trait;

use crate::error::EngineError;

pub use failed_downloads::FailedDownloadsHandler;
pub use handler::JobHandler;
pub use job_file::{JobFile, JobFileManager, JobInfo};
pub use orchestrator::Orchestrator;
pub use retry::RetryEngine;
pub use state::{JobState, JobsState};

pub type Result<T> = std::result::Result<T, EngineError>;

/// A unit of work with a single entry point.
///
/// Implementations catch their own per-item failures; an error returned from
/// `handle` is one the caller cannot recover from.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self) -> Result<()>;
}
