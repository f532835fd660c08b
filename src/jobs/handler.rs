//! Per-job worker for grabbed downloads
//!
//! One handler owns one marker file for the duration of its run:
//! 1. Registers the job as `initiated`
//! 2. Waits for the download to show up in the download client's queue
//! 3. Waits for the downloaded file (or season folder) to land in cloud storage
//! 4. Copies it into the series library and refreshes the series
//! 5. Moves the marker to `done/` and registers the job as `finished`
//!
//! Any failure is logged with the best identifier at hand and turns into the
//! `error` state. Only an interrupted wait escapes the handler.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::job_file::{JobFile, JobInfo};
use super::retry::RetryEngine;
use super::state::JobsState;
use super::{Handler, Result};
use crate::error::EngineError;
use crate::services::{Collaborators, QueueRecord, RemoteElement};

/// Wait intervals and attempt bound for the polling steps.
#[derive(Debug, Clone, Copy)]
pub struct HandlerSettings {
    pub download_client_wait_minutes: u64,
    pub cloud_wait_minutes: u64,
    /// `None` polls until the element shows up.
    pub max_attempts: Option<u32>,
}

/// What is known about a job while it runs, for error reporting.
#[derive(Debug, Default)]
struct Progress {
    title: Option<String>,
    work_started: bool,
}

impl Progress {
    /// Start from the marker's release title; the queue record's title replaces it later.
    fn for_job(info: &JobInfo) -> Self {
        Self {
            title: info.release_title.clone(),
            work_started: false,
        }
    }

    fn identifier(&self, job: &JobFile) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| job.path().display().to_string())
    }
}

pub struct JobHandler {
    job_id: String,
    file_name: String,
    job_file: Mutex<JobFile>,
    jobs: Arc<JobsState>,
    services: Collaborators,
    settings: HandlerSettings,
}

impl JobHandler {
    pub fn new(
        job_file: JobFile,
        jobs: Arc<JobsState>,
        services: Collaborators,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            job_id: job_file.job_id().to_string(),
            file_name: job_file.file_name().to_string(),
            job_file: Mutex::new(job_file),
            jobs,
            services,
            settings,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Run the whole job without waiting: succeeds only if the download is
    /// already complete everywhere. Otherwise the job ends in `error` and is
    /// picked up again by the main pass.
    pub async fn try_to_move_if_possible(&self) -> Result<()> {
        self.run(Some(1), true).await
    }

    async fn run(&self, max_attempts: Option<u32>, eager: bool) -> Result<()> {
        let mut job = self.job_file.lock().await;
        let mut progress = Progress::default();

        let Err(e) = self.process(&mut job, max_attempts, &mut progress).await else {
            return Ok(());
        };

        let identifier = progress.identifier(&job);
        if eager {
            info!(
                job = "grabbed_downloads",
                job_id = %self.job_id,
                error = %e,
                "not going to work now with {}",
                identifier
            );
        } else {
            error!(
                job = "grabbed_downloads",
                job_id = %self.job_id,
                error = %e,
                "Failed to handle job {}",
                identifier
            );
        }

        if progress.work_started
            && let Err(move_err) = job.mark_retry().await
        {
            warn!(job_id = %self.job_id, error = %move_err, "Could not return job file to todo");
        }
        if let Err(state_err) = self.jobs.job_error(&self.job_id, &self.file_name) {
            debug!(job_id = %self.job_id, error = %state_err, "Job error state not recorded");
        }

        if e.is_fatal() { Err(e) } else { Ok(()) }
    }

    async fn process(
        &self,
        job: &mut JobFile,
        max_attempts: Option<u32>,
        progress: &mut Progress,
    ) -> Result<()> {
        self.jobs.job_initiated(&self.job_id)?;
        let info = job.info()?.clone();
        *progress = Progress::for_job(&info);

        let record = self.wait_for_queue_record(&info, max_attempts).await?;
        progress.title = Some(record.title.clone());
        let element_name = record
            .downloaded_name()
            .ok_or_else(|| {
                EngineError::IncorrectWorkingReference(format!("no output path for {}", record.title))
            })?
            .to_string();
        self.jobs.job_has_file_name(&self.job_id)?;

        self.wait_for_download(&element_name, &info, max_attempts).await?;

        self.jobs.job_working(&self.job_id)?;
        job.mark_doing().await?;
        progress.work_started = true;

        let series = self
            .services
            .download_client
            .get_series_by_id(info.series_id)
            .await?;
        let naming = &self.services.naming;
        let season_folder = naming
            .season_folder_name(&record.title)
            .or_else(|_| naming.season_folder_name(&element_name))?;

        if info.is_season_pack() {
            self.services
                .copier
                .copy_season(&element_name, &series.path, &season_folder)
                .await?;
        } else {
            self.services
                .copier
                .copy_episode(&element_name, &series.path, &season_folder)
                .await?;
        }
        self.services.refresher.refresh_series(&series, record.id).await?;

        job.mark_done().await?;
        self.jobs.job_finished(&self.job_id, &self.file_name)?;
        info!(
            job = "grabbed_downloads",
            job_id = %self.job_id,
            title = %record.title,
            "Job handled"
        );
        Ok(())
    }

    async fn wait_for_queue_record(
        &self,
        info: &JobInfo,
        max_attempts: Option<u32>,
    ) -> Result<QueueRecord> {
        let engine = RetryEngine::new(
            self.settings.download_client_wait_minutes,
            self.services.clock.clone(),
        )
        .with_max_attempts(max_attempts);

        engine
            .try_until_got_desired(|| {
                let client = self.services.download_client.clone();
                let download_id = info.download_id.clone();
                async move {
                    let queue = client.list_queue().await?;
                    Ok(queue.into_iter().find(|record| {
                        record
                            .download_id
                            .as_deref()
                            .is_some_and(|id| id.eq_ignore_ascii_case(&download_id))
                    }))
                }
            })
            .await
    }

    async fn wait_for_download(
        &self,
        element_name: &str,
        info: &JobInfo,
        max_attempts: Option<u32>,
    ) -> Result<RemoteElement> {
        let mut engine = RetryEngine::new(self.settings.cloud_wait_minutes, self.services.clock.clone())
            .with_max_attempts(max_attempts);
        if info.is_season_pack() {
            let copier = self.services.copier.clone();
            engine = engine.with_children(info.episode_count, move |folder: RemoteElement| {
                let copier = copier.clone();
                async move { copier.download_files(&folder).await }
            });
        }

        engine
            .try_until_got_desired(|| {
                let copier = self.services.copier.clone();
                let name = element_name.to_string();
                async move { copier.find_download(&name).await }
            })
            .await
    }
}

#[async_trait]
impl Handler for JobHandler {
    async fn handle(&self) -> Result<()> {
        self.run(self.settings.max_attempts, false).await
    }
}
