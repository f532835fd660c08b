//! Shared fixtures: in-memory download client and media server, plus a
//! temporary directory tree standing in for the job markers and the mounted
//! cloud drive.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use tempfile::TempDir;
use tokio::sync::watch;

use courier::EngineError;
use courier::config::LoopFlag;
use courier::jobs::handler::HandlerSettings;
use courier::jobs::orchestrator::OrchestratorSettings;
use courier::jobs::{JobFileManager, JobsState, Orchestrator};
use courier::services::{
    Clock, Collaborators, CopyService, DownloadClient, MediaServer, MountedStorage, QueueRecord,
    SeasonNaming, Series, SeriesRefresher,
};

// ============================================================================
// Fake collaborators
// ============================================================================

/// Download client backed by in-memory records. Every call is logged.
#[derive(Default)]
pub struct FakeDownloadClient {
    queue: Mutex<Vec<QueueRecord>>,
    series: Mutex<HashMap<i64, Series>>,
    /// Queue listings that come back empty before the records show up.
    empty_listings: AtomicUsize,
    /// When set, queue listings block until the gate opens.
    gate: Option<watch::Receiver<bool>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeDownloadClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client whose queue listings wait for the returned sender to send `true`.
    pub fn gated() -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let client = Self {
            gate: Some(rx),
            ..Self::default()
        };
        (client, tx)
    }

    pub fn with_record(self, record: QueueRecord) -> Self {
        self.queue.lock().push(record);
        self
    }

    pub fn with_series(self, id: i64, title: &str, path: &str) -> Self {
        self.series.lock().insert(
            id,
            Series {
                id,
                title: title.into(),
                path: path.into(),
            },
        );
        self
    }

    pub fn empty_for_first_listings(self, count: usize) -> Self {
        self.empty_listings.store(count, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn log(&self, call: String) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl DownloadClient for FakeDownloadClient {
    async fn list_queue(&self) -> Result<Vec<QueueRecord>, EngineError> {
        if let Some(mut gate) = self.gate.clone() {
            gate.wait_for(|open| *open)
                .await
                .map_err(|_| EngineError::NoElementFound("gate dropped".into()))?;
        }
        self.log("list_queue".into());

        let pending_empty = self
            .empty_listings
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending_empty.is_ok() {
            return Ok(vec![]);
        }
        Ok(self.queue.lock().clone())
    }

    async fn get_series_by_id(&self, id: i64) -> Result<Series, EngineError> {
        self.log(format!("get_series {id}"));
        self.series
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::NoElementFound(format!("series {id}")))
    }

    async fn delete_queue_item(&self, id: i64) -> Result<(), EngineError> {
        self.log(format!("delete_queue_item {id}"));
        Ok(())
    }

    async fn refresh_series(&self, id: i64) -> Result<(), EngineError> {
        self.log(format!("refresh_series {id}"));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeMediaServer {
    pub rescans: Mutex<Vec<String>>,
}

#[async_trait]
impl MediaServer for FakeMediaServer {
    async fn rescan_path(&self, path: &str) -> Result<(), EngineError> {
        self.rescans.lock().push(path.to_string());
        Ok(())
    }
}

pub fn queue_record(id: i64, series_id: i64, title: &str, output_path: &str, download_id: &str) -> QueueRecord {
    QueueRecord {
        id,
        series_id,
        title: title.into(),
        output_path: Some(output_path.into()),
        download_id: Some(download_id.into()),
    }
}

// ============================================================================
// Workspace
// ============================================================================

pub const DOWNLOAD_CLIENT_WAIT_MINUTES: u64 = 5;
pub const CLOUD_WAIT_MINUTES: u64 = 10;

/// Job marker tree and mounted cloud folders in a temporary directory.
pub struct Workspace {
    _dir: TempDir,
    pub job_files: JobFileManager,
    pub downloads: PathBuf,
    pub series: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let job_files = JobFileManager::new(dir.path().join("jobs"));
        for dir in [job_files.todo_dir(), job_files.doing_dir(), job_files.done_dir()] {
            std::fs::create_dir_all(dir).expect("job layout");
        }
        let downloads = dir.path().join("downloads");
        let series = dir.path().join("series");
        std::fs::create_dir_all(&downloads).expect("downloads dir");
        std::fs::create_dir_all(&series).expect("series dir");
        Self {
            _dir: dir,
            job_files,
            downloads,
            series,
        }
    }

    pub fn write_marker(&self, name: &str, download_id: &str, series_id: i64, episode_count: usize) -> PathBuf {
        let path = self.job_files.todo_dir().join(name);
        std::fs::write(
            &path,
            format!("download_id: {download_id}\nseries_id: {series_id}\nepisode_count: {episode_count}\n"),
        )
        .expect("write marker");
        path
    }

    pub fn add_download(&self, name: &str) {
        std::fs::write(self.downloads.join(name), name).expect("write download");
    }

    pub fn add_season_download(&self, folder: &str, episodes: &[&str]) {
        let dir = self.downloads.join(folder);
        std::fs::create_dir_all(&dir).expect("season dir");
        for episode in episodes {
            std::fs::write(dir.join(episode), episode).expect("write episode");
        }
    }

    pub fn library_file(&self, series: &str, season: &str, file: &str) -> PathBuf {
        self.series.join(series).join(season).join(file)
    }

    pub fn services(
        &self,
        download_client: Arc<FakeDownloadClient>,
        media_server: Arc<FakeMediaServer>,
        clock: Arc<dyn Clock>,
    ) -> Collaborators {
        let copier = CopyService::new(
            Arc::new(MountedStorage::new()),
            path_id(&self.downloads),
            path_id(&self.series),
        );
        let refresher = SeriesRefresher::new(
            download_client.clone(),
            media_server,
            "/tv".into(),
            "/mnt/series".into(),
        );
        Collaborators {
            download_client,
            copier: Arc::new(copier),
            refresher: Arc::new(refresher),
            naming: Arc::new(SeasonNaming::new("Temporada").expect("season naming")),
            clock,
        }
    }

    pub fn orchestrator(&self, services: Collaborators, max_attempts: Option<u32>, keep_running: bool) -> Orchestrator {
        let settings = OrchestratorSettings {
            job_file_pattern: Regex::new(r"^.+\.job$").expect("pattern"),
            round_interval: std::time::Duration::from_secs(300),
            dispatch_stagger: std::time::Duration::from_secs(5),
            handler: HandlerSettings {
                download_client_wait_minutes: DOWNLOAD_CLIENT_WAIT_MINUTES,
                cloud_wait_minutes: CLOUD_WAIT_MINUTES,
                max_attempts,
            },
            keep_running: LoopFlag::Fixed(keep_running),
        };
        Orchestrator::new(self.job_files.clone(), Arc::new(JobsState::new()), services, settings)
    }
}

fn path_id(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
