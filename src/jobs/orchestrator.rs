//! Grabbed-downloads orchestrator
//!
//! Each round:
//! 1. Pre-pass: every marker not already being handled gets one eager, serial
//!    attempt, so downloads that are already complete are drained first.
//! 2. Main pass: markers are rediscovered and each one not being handled is
//!    dispatched to its own worker, with a short stagger between dispatches.
//! 3. The throttled jobs resume is printed, then the loop sleeps until the next
//!    round, as long as the loop flag stays enabled.
//!
//! Workers outlive the round that spawned them; they are tracked in a `JoinSet`
//! that is reaped at the start of every round.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::handler::{HandlerSettings, JobHandler};
use super::job_file::{JobFile, JobFileManager};
use super::state::JobsState;
use super::{Handler, Result};
use crate::config::LoopFlag;
use crate::services::Collaborators;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub job_file_pattern: Regex,
    pub round_interval: Duration,
    pub dispatch_stagger: Duration,
    pub handler: HandlerSettings,
    pub keep_running: LoopFlag,
}

pub struct Orchestrator {
    job_files: JobFileManager,
    jobs: Arc<JobsState>,
    services: Collaborators,
    settings: OrchestratorSettings,
    workers: Mutex<JoinSet<()>>,
}

impl Orchestrator {
    pub fn new(
        job_files: JobFileManager,
        jobs: Arc<JobsState>,
        services: Collaborators,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            job_files,
            jobs,
            services,
            settings,
            workers: Mutex::new(JoinSet::new()),
        }
    }

    pub fn jobs(&self) -> &Arc<JobsState> {
        &self.jobs
    }

    /// Run rounds until the loop flag turns off, then wait for in-flight workers.
    pub async fn run(&self) -> Result<()> {
        self.job_files.ensure_layout().await?;
        let moved = self.job_files.move_uncompleted_jobs_to_retry().await;
        info!(job = "grabbed_downloads", moved, "Grabbed downloads handler started");

        loop {
            self.run_round().await?;

            if !self.settings.keep_running.is_enabled() {
                info!(job = "grabbed_downloads", "Loop disabled, finishing after this round");
                break;
            }
            debug!(
                job = "grabbed_downloads",
                wait_secs = self.settings.round_interval.as_secs(),
                "Waiting for next round"
            );
            self.services.clock.sleep(self.settings.round_interval).await?;
        }

        self.wait_for_workers().await;
        Ok(())
    }

    /// One full round: pre-pass, dispatch, report. Returns the number of workers dispatched.
    pub async fn run_round(&self) -> Result<usize> {
        self.reap_workers();
        self.pre_pass().await?;
        let dispatched = self.dispatch_round().await?;
        self.jobs.resume_jobs_log_print();
        Ok(dispatched)
    }

    /// Give every marker not already being handled one eager attempt, one at a time.
    pub async fn pre_pass(&self) -> Result<()> {
        let files = self
            .job_files
            .retrieve_job_files(&self.settings.job_file_pattern)
            .await;
        for path in files {
            let Some(name) = marker_name(&path) else { continue };
            if self.jobs.is_handling(&name) {
                continue;
            }
            let Some(handler) = self.load_handler(&path).await else { continue };

            debug!(job = "grabbed_downloads", file = %name, "Trying to move eagerly");
            handler.try_to_move_if_possible().await?;
        }
        Ok(())
    }

    /// Dispatch a worker for every discovered marker not already being handled.
    pub async fn dispatch_round(&self) -> Result<usize> {
        let files = self
            .job_files
            .retrieve_job_files(&self.settings.job_file_pattern)
            .await;
        if files.is_empty() {
            debug!(job = "grabbed_downloads", "No job files found");
            return Ok(0);
        }

        let pool = Arc::new(Semaphore::new(files.len()));
        let mut dispatched = 0;

        for path in files {
            let Some(name) = marker_name(&path) else { continue };
            if !self.jobs.try_start_handling(&name) {
                debug!(job = "grabbed_downloads", file = %name, "Already handling job file");
                continue;
            }
            let Some(handler) = self.load_handler(&path).await else {
                self.jobs.stop_handling(&name);
                continue;
            };

            let job_id = handler.job_id().to_string();
            self.workers.lock().spawn(run_worker(
                pool.clone(),
                self.jobs.clone(),
                name,
                job_id,
                handler,
            ));
            dispatched += 1;

            self.services.clock.sleep(self.settings.dispatch_stagger).await?;
        }

        info!(job = "grabbed_downloads", dispatched, "Dispatched job workers");
        Ok(dispatched)
    }

    /// Wait until every worker spawned so far has finished.
    pub async fn wait_for_workers(&self) {
        let mut workers = std::mem::take(&mut *self.workers.lock());
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                warn!(job = "grabbed_downloads", error = %e, "Worker task failed");
            }
        }
    }

    fn reap_workers(&self) {
        let mut workers = self.workers.lock();
        while let Some(result) = workers.try_join_next() {
            if let Err(e) = result {
                warn!(job = "grabbed_downloads", error = %e, "Worker task failed");
            }
        }
    }

    async fn load_handler(&self, path: &Path) -> Option<Arc<JobHandler>> {
        match JobFile::load(path, &self.job_files).await {
            Ok(job_file) => Some(Arc::new(JobHandler::new(
                job_file,
                self.jobs.clone(),
                self.services.clone(),
                self.settings.handler,
            ))),
            Err(e) => {
                warn!(job = "grabbed_downloads", path = %path.display(), error = %e, "Could not read job file");
                None
            }
        }
    }
}

/// Body of one dispatched worker. A worker that never gets a slot gives its
/// marker claim back so a later round can pick the file up again.
async fn run_worker<H: Handler + ?Sized>(
    pool: Arc<Semaphore>,
    jobs: Arc<JobsState>,
    file_name: String,
    job_id: String,
    handler: Arc<H>,
) {
    let Ok(_permit) = pool.acquire_owned().await else {
        warn!(job = "grabbed_downloads", file = %file_name, "Worker pool closed before start");
        jobs.stop_handling(&file_name);
        return;
    };
    debug!(job = "grabbed_downloads", job_id = %job_id, "Worker started");
    if let Err(e) = handler.handle().await {
        error!(
            job = "grabbed_downloads",
            job_id = %job_id,
            error = %e,
            "Worker stopped"
        );
    }
}

fn marker_name(path: &Path) -> Option<String> {
    path.file_name().and_then(|n| n.to_str()).map(str::to_string)
}

#[async_trait]
impl Handler for Orchestrator {
    async fn handle(&self) -> Result<()> {
        self.run().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingHandler {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Handler for CountingHandler {
        async fn handle(&self) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn closed_pool_releases_the_claim() {
        let jobs = Arc::new(JobsState::new());
        assert!(jobs.try_start_handling("showA.job"));
        let pool = Arc::new(Semaphore::new(1));
        pool.close();
        let handler = Arc::new(CountingHandler::default());

        run_worker(pool, jobs.clone(), "showA.job".into(), "showA".into(), handler.clone()).await;

        assert!(!jobs.is_handling("showA.job"));
        assert_eq!(handler.runs.load(Ordering::SeqCst), 0);
        assert!(jobs.try_start_handling("showA.job"));
    }

    #[tokio::test]
    async fn open_pool_runs_the_handler() {
        let jobs = Arc::new(JobsState::new());
        assert!(jobs.try_start_handling("showB.job"));
        let handler = Arc::new(CountingHandler::default());

        run_worker(
            Arc::new(Semaphore::new(1)),
            jobs.clone(),
            "showB.job".into(),
            "showB".into(),
            handler.clone(),
        )
        .await;

        assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
        assert!(jobs.is_handling("showB.job"));
    }

    #[test]
    fn marker_name_is_the_file_name() {
        assert_eq!(marker_name(Path::new("/jobs/todo/showA.job")).as_deref(), Some("showA.job"));
        assert_eq!(marker_name(Path::new("/")), None);
    }
}
