//! In-process registry of job states
//!
//! Shared by the orchestrator and every worker. All access goes through the
//! methods below; a single lock guards the state map, the handling set, the
//! active-work pointer and the report snapshot, so the reporter always reads a
//! consistent map.

use std::collections::{HashMap, HashSet};
use std::fmt;

use parking_lot::Mutex;
use tracing::{info, warn};

use super::Result;
use crate::error::EngineError;

/// Rounds the reporter stays quiet before printing again.
const REPORT_DELAY_THRESHOLD: u32 = 10;

/// Lifecycle of a grabbed download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Initiated,
    HasFilename,
    Working,
    Finished,
    Error,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Initiated => "initiated",
            JobState::HasFilename => "has filename",
            JobState::Working => "working",
            JobState::Finished => "finished",
            JobState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished | JobState::Error)
    }

    /// Whether a job currently in `from` (or unknown) may move to `to`.
    ///
    /// Terminal jobs may only be re-initiated, which happens when their marker
    /// file is discovered again.
    pub fn can_transition(from: Option<JobState>, to: JobState) -> bool {
        use JobState::*;
        match (from, to) {
            (None, Initiated) => true,
            (Some(state), Initiated) => state.is_terminal(),
            (Some(Initiated), HasFilename) => true,
            (Some(HasFilename), Working) => true,
            (Some(Working), Finished) => true,
            (Some(Initiated | HasFilename | Working), Error) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct Registry {
    states: HashMap<String, JobState>,
    printed_last_time: HashMap<String, JobState>,
    report_delay_counter: u32,
    handling_files: HashSet<String>,
    // Single pointer shared by every worker. Under parallel workers it reflects
    // whichever job last started or ended, not necessarily the one being asked about.
    job_currently_in_work: Option<String>,
}

impl Registry {
    fn transition(&mut self, job: &str, to: JobState) -> Result<()> {
        let from = self.states.get(job).copied();
        if !JobState::can_transition(from, to) {
            let from = from.map_or("unknown", |s| s.as_str()).to_string();
            warn!(job_id = %job, %from, %to, "Rejected job state transition");
            return Err(EngineError::InvalidTransition {
                job: job.to_string(),
                from,
                to,
            });
        }
        self.states.insert(job.to_string(), to);
        Ok(())
    }

    fn release(&mut self, file_name: &str) {
        self.handling_files.remove(file_name);
        self.job_currently_in_work = None;
    }

    fn same_resume_already_printed(&self) -> bool {
        self.printed_last_time == self.states
    }
}

/// Thread-safe registry handed to the orchestrator and to each worker.
#[derive(Debug, Default)]
pub struct JobsState {
    inner: Mutex<Registry>,
}

impl JobsState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_initiated(&self, job: &str) -> Result<()> {
        self.inner.lock().transition(job, JobState::Initiated)
    }

    pub fn job_has_file_name(&self, job: &str) -> Result<()> {
        self.inner.lock().transition(job, JobState::HasFilename)
    }

    pub fn job_working(&self, job: &str) -> Result<()> {
        info!(job_id = %job, "WORKING WITH {}", job);
        let mut registry = self.inner.lock();
        registry.transition(job, JobState::Working)?;
        registry.job_currently_in_work = Some(job.to_string());
        Ok(())
    }

    /// Mark the job finished and release its marker file from the handling set.
    ///
    /// The file is released even when the transition is rejected.
    pub fn job_finished(&self, job: &str, file_name: &str) -> Result<()> {
        info!(job_id = %job, "NOT WORKING ANYMORE WITH {}", job);
        let mut registry = self.inner.lock();
        registry.release(file_name);
        registry.transition(job, JobState::Finished)
    }

    /// Mark the job failed and release its marker file from the handling set.
    pub fn job_error(&self, job: &str, file_name: &str) -> Result<()> {
        info!(job_id = %job, "NOT WORKING ANYMORE WITH {}", job);
        let mut registry = self.inner.lock();
        registry.release(file_name);
        registry.transition(job, JobState::Error)
    }

    pub fn is_working_with_a_job(&self) -> bool {
        self.inner.lock().job_currently_in_work.is_some()
    }

    pub fn is_job_working(&self, job: &str) -> bool {
        self.inner.lock().job_currently_in_work.as_deref() == Some(job)
    }

    pub fn state_of(&self, job: &str) -> Option<JobState> {
        self.inner.lock().states.get(job).copied()
    }

    /// Claim a marker file for a new worker. Returns `false` if it is already being handled.
    pub fn try_start_handling(&self, file_name: &str) -> bool {
        self.inner.lock().handling_files.insert(file_name.to_string())
    }

    pub fn is_handling(&self, file_name: &str) -> bool {
        self.inner.lock().handling_files.contains(file_name)
    }

    /// Release a claim taken by [`try_start_handling`](Self::try_start_handling) without
    /// touching any job state (used when the worker never started).
    pub fn stop_handling(&self, file_name: &str) {
        self.inner.lock().handling_files.remove(file_name);
    }

    pub fn handling_count(&self) -> usize {
        self.inner.lock().handling_files.len()
    }

    /// Throttled dump of every job state.
    ///
    /// Called once per orchestrator round. Prints when more than
    /// [`REPORT_DELAY_THRESHOLD`] rounds have passed and the states differ from the
    /// last printed snapshot. Returns whether it printed.
    pub fn resume_jobs_log_print(&self) -> bool {
        let mut registry = self.inner.lock();
        registry.report_delay_counter += 1;
        if registry.report_delay_counter <= REPORT_DELAY_THRESHOLD
            || registry.same_resume_already_printed()
        {
            return false;
        }

        let mut jobs: Vec<_> = registry.states.iter().collect();
        jobs.sort_by(|a, b| a.0.cmp(b.0));

        info!("**** RESUME JOBS ****");
        for (job, state) in jobs {
            info!("Job: {} | current state: {}", job, state);
        }
        info!("**** RESUME JOBS ****");

        let snapshot = registry.states.clone();
        registry.report_delay_counter = 0;
        registry.printed_last_time = snapshot;
        true
    }

    /// True iff the live states equal the last printed snapshot.
    pub fn same_resume_already_printed(&self) -> bool {
        self.inner.lock().same_resume_already_printed()
    }

    #[cfg(test)]
    fn set_report_delay_counter(&self, value: u32) {
        self.inner.lock().report_delay_counter = value;
    }
}
