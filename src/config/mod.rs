//! Application configuration management

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;

use crate::jobs::handler::HandlerSettings;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// `ENV=local` shortens every wait for local testing
    pub local_environment: bool,

    /// Root of the job marker tree (`todo/`, `doing/`, `done/`)
    pub jobs_dir: String,

    /// Pattern matched against marker file names
    pub job_file_pattern: Regex,

    /// Attempt bound for the polling loops (0 = unbounded)
    pub retry_max_attempts: u32,

    pub sonarr_url: String,
    pub sonarr_api_key: String,

    pub plex_url: String,
    pub plex_token: String,
    pub plex_section_id: u32,

    /// Series path prefix as seen by Sonarr, rewritten to `plex_path_to` for scans
    pub plex_path_from: String,
    pub plex_path_to: String,

    /// Mounted cloud folder the downloads land in
    pub cloud_downloads_dir: String,

    /// Mounted cloud folder holding the series library
    pub cloud_series_dir: String,

    /// Localized season folder label ("Temporada 02")
    pub season_folder_label: String,

    /// Emit JSON logs
    pub log_json: bool,
}

impl Config {
    pub const ROUND_INTERVAL: Duration = Duration::from_secs(5 * 60);
    pub const DISPATCH_STAGGER: Duration = Duration::from_secs(5);

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let pattern = env::var("JOB_FILE_PATTERN").unwrap_or_else(|_| r"^.+\.job$".to_string());
        let job_file_pattern =
            Regex::new(&pattern).with_context(|| format!("Invalid JOB_FILE_PATTERN: {pattern}"))?;

        Ok(Self {
            local_environment: env::var("ENV").is_ok_and(|v| v.eq_ignore_ascii_case("local")),

            jobs_dir: env::var("JOBS_DIR").unwrap_or_else(|_| "./data/jobs".to_string()),

            job_file_pattern,

            retry_max_attempts: env::var("RETRY_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .context("Invalid RETRY_MAX_ATTEMPTS")?,

            sonarr_url: env::var("SONARR_URL").unwrap_or_else(|_| "http://localhost:8989".to_string()),
            sonarr_api_key: env::var("SONARR_API_KEY").context("SONARR_API_KEY is required")?,

            plex_url: env::var("PLEX_URL").unwrap_or_else(|_| "http://localhost:32400".to_string()),
            plex_token: env::var("PLEX_TOKEN").context("PLEX_TOKEN is required")?,
            plex_section_id: env::var("PLEX_SECTION_ID")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .context("Invalid PLEX_SECTION_ID")?,

            plex_path_from: env::var("PLEX_PATH_FROM").unwrap_or_else(|_| "/tv".to_string()),
            plex_path_to: env::var("PLEX_PATH_TO").unwrap_or_else(|_| "/tv".to_string()),

            cloud_downloads_dir: env::var("CLOUD_DOWNLOADS_DIR")
                .unwrap_or_else(|_| "./data/cloud/downloads".to_string()),
            cloud_series_dir: env::var("CLOUD_SERIES_DIR")
                .unwrap_or_else(|_| "./data/cloud/series".to_string()),

            season_folder_label: env::var("SEASON_FOLDER_LABEL")
                .unwrap_or_else(|_| "Temporada".to_string()),

            log_json: env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")),
        })
    }

    pub fn cloud_wait_minutes(&self) -> u64 {
        if self.local_environment { 2 } else { 10 }
    }

    pub fn download_client_wait_minutes(&self) -> u64 {
        if self.local_environment { 2 } else { 5 }
    }

    pub fn handler_settings(&self) -> HandlerSettings {
        HandlerSettings {
            download_client_wait_minutes: self.download_client_wait_minutes(),
            cloud_wait_minutes: self.cloud_wait_minutes(),
            max_attempts: (self.retry_max_attempts > 0).then_some(self.retry_max_attempts),
        }
    }
}

/// Whether the orchestrator keeps looping after a round.
#[derive(Debug, Clone)]
pub enum LoopFlag {
    /// Re-read `IMMORTAL_PROCESS` on every check (default `true`).
    FromEnv,
    Fixed(bool),
}

impl LoopFlag {
    pub fn is_enabled(&self) -> bool {
        match self {
            LoopFlag::FromEnv => env::var("IMMORTAL_PROCESS")
                .map(|v| parse_bool(&v))
                .unwrap_or(true),
            LoopFlag::Fixed(value) => *value,
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}
