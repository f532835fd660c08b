//! Job marker files
//!
//! A grab hook drops one marker file per grabbed download into `todo/`. Markers
//! hold `key: value` lines; keys may carry the `sonarr_` prefix the download
//! client uses for its script environment:
//!
//! ```text
//! download_id: 2F9A0C...
//! series_id: 123
//! release_title: Some Show S02 1080p WEB-DL
//! episode_count: 8
//! ```
//!
//! Markers move `todo/ -> doing/` when copying starts and `doing/ -> done/` once
//! the job finishes. Failures after that point send the marker back to `todo/`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::Result;
use crate::error::EngineError;

const TODO_DIR: &str = "todo";
const DOING_DIR: &str = "doing";
const DONE_DIR: &str = "done";

/// Metadata read from a marker file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub download_id: String,
    pub series_id: i64,
    pub release_title: Option<String>,
    /// Number of episodes in the release; more than one means a season pack.
    pub episode_count: usize,
}

impl JobInfo {
    /// Parse marker contents. `None` when a required key is missing or malformed.
    pub fn parse(contents: &str) -> Option<Self> {
        let entries: HashMap<String, String> = contents
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| {
                let key = key.trim().to_lowercase();
                let key = key.strip_prefix("sonarr_").unwrap_or(&key).to_string();
                (key, value.trim().to_string())
            })
            .filter(|(key, value)| !key.is_empty() && !value.is_empty())
            .collect();

        let download_id = entries.get("download_id")?.clone();
        let series_id = entries.get("series_id")?.parse().ok()?;
        let episode_count = entries
            .get("episode_count")
            .or_else(|| entries.get("release_episodecount"))
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);

        Some(Self {
            download_id,
            series_id,
            release_title: entries.get("release_title").cloned(),
            episode_count,
        })
    }

    pub fn is_season_pack(&self) -> bool {
        self.episode_count > 1
    }
}

/// Directory tree holding the marker files.
#[derive(Debug, Clone)]
pub struct JobFileManager {
    root: PathBuf,
}

impl JobFileManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn todo_dir(&self) -> PathBuf {
        self.root.join(TODO_DIR)
    }

    pub fn doing_dir(&self) -> PathBuf {
        self.root.join(DOING_DIR)
    }

    pub fn done_dir(&self) -> PathBuf {
        self.root.join(DONE_DIR)
    }

    /// Create `todo/`, `doing/` and `done/` if missing.
    pub async fn ensure_layout(&self) -> Result<()> {
        for dir in [self.todo_dir(), self.doing_dir(), self.done_dir()] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    /// Marker files in `todo/` whose name matches `pattern`. Order is not meaningful.
    ///
    /// Unreadable entries are logged and skipped.
    pub async fn retrieve_job_files(&self, pattern: &Regex) -> Vec<PathBuf> {
        let dir = self.todo_dir();
        let pattern = pattern.clone();
        let scan = tokio::task::spawn_blocking(move || {
            list_files(&dir)
                .into_iter()
                .filter(|path| {
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|name| pattern.is_match(name))
                })
                .collect()
        });
        match scan.await {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "Job file scan failed");
                Vec::new()
            }
        }
    }

    /// Send markers left in `doing/` by a previous run back to `todo/`.
    ///
    /// Returns how many markers were moved.
    pub async fn move_uncompleted_jobs_to_retry(&self) -> usize {
        let doing = self.doing_dir();
        let todo = self.todo_dir();
        match tokio::task::spawn_blocking(move || move_all(&doing, &todo)).await {
            Ok(moved) => moved,
            Err(e) => {
                warn!(error = %e, "Moving uncompleted jobs failed");
                0
            }
        }
    }
}

fn move_all(from: &Path, to: &Path) -> usize {
    let mut moved = 0;
    for path in list_files(from) {
        let Some(name) = path.file_name() else { continue };
        match std::fs::rename(&path, to.join(name)) {
            Ok(()) => {
                info!(path = %path.display(), "Moved uncompleted job back to retry");
                moved += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not move uncompleted job to retry");
            }
        }
    }
    moved
}

fn list_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Skipping unreadable job entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

/// One marker file and the job metadata it carries.
#[derive(Debug, Clone)]
pub struct JobFile {
    path: PathBuf,
    file_name: String,
    job_id: String,
    info: Option<JobInfo>,
    layout: JobFileManager,
}

impl JobFile {
    pub async fn load(path: &Path, layout: &JobFileManager) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                EngineError::IncorrectWorkingReference(format!("invalid job file name: {}", path.display()))
            })?
            .to_string();
        let job_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&file_name)
            .to_string();

        let contents = tokio::fs::read_to_string(path).await?;
        let info = JobInfo::parse(&contents);
        debug!(path = %path.display(), has_info = info.is_some(), "Loaded job file");

        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            job_id,
            info,
            layout: layout.clone(),
        })
    }

    pub fn has_info(&self) -> bool {
        self.info.is_some()
    }

    pub fn info(&self) -> Result<&JobInfo> {
        self.info
            .as_ref()
            .ok_or_else(|| EngineError::IncorrectWorkingReference("no valid info at file".into()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Identifier used in the jobs registry: the marker name without extension.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub async fn mark_doing(&mut self) -> Result<()> {
        let dir = self.layout.doing_dir();
        self.move_to(dir).await
    }

    pub async fn mark_done(&mut self) -> Result<()> {
        let dir = self.layout.done_dir();
        self.move_to(dir).await
    }

    /// Put the marker back in `todo/` so a later scan retries it.
    pub async fn mark_retry(&mut self) -> Result<()> {
        let dir = self.layout.todo_dir();
        self.move_to(dir).await
    }

    async fn move_to(&mut self, dir: PathBuf) -> Result<()> {
        if self.path.parent() == Some(dir.as_path()) {
            return Ok(());
        }
        let target = dir.join(&self.file_name);
        tokio::fs::rename(&self.path, &target).await?;
        debug!(from = %self.path.display(), to = %target.display(), "Moved job file");
        self.path = target;
        Ok(())
    }
}
