//! Failed downloads replay
//!
//! One-shot pass over the download client's queue for items whose import
//! failed. Records sharing a title belong to one season pack; a title seen once
//! is a single episode. Each season or episode is copied into the library and
//! refreshed on its own, so one failure never stops the rest.

use async_trait::async_trait;
use tracing::{error, info};

use super::{Handler, Result};
use crate::error::EngineError;
use crate::services::{Collaborators, QueueRecord};

/// A season pack rebuilt from the queue records that share its title.
#[derive(Debug, Clone, PartialEq)]
pub struct Season {
    pub title: String,
    pub series_id: i64,
    pub downloaded_folder_name: Option<String>,
    pub queue_item_id: i64,
}

impl Season {
    pub fn new(title: String, first_record: &QueueRecord) -> Self {
        Self {
            title,
            series_id: first_record.series_id,
            downloaded_folder_name: first_record.downloaded_name().map(str::to_string),
            queue_item_id: first_record.id,
        }
    }
}

/// Seasons and single episodes found in one queue listing.
#[derive(Debug, Default)]
pub struct GroupedRecords {
    pub seasons: Vec<Season>,
    pub episodes: Vec<QueueRecord>,
}

/// Group records by identical title, keeping the order titles first appear in.
pub fn group_by_title(records: Vec<QueueRecord>) -> GroupedRecords {
    let mut groups: Vec<(String, Vec<QueueRecord>)> = Vec::new();
    for record in records {
        match groups.iter_mut().find(|(title, _)| *title == record.title) {
            Some((_, group)) => group.push(record),
            None => groups.push((record.title.clone(), vec![record])),
        }
    }

    let mut grouped = GroupedRecords::default();
    for (title, mut group) in groups {
        if group.len() > 1 {
            grouped.seasons.push(Season::new(title, &group[0]));
        } else if let Some(record) = group.pop() {
            grouped.episodes.push(record);
        }
    }
    grouped
}

pub struct FailedDownloadsHandler {
    services: Collaborators,
}

impl FailedDownloadsHandler {
    pub fn new(services: Collaborators) -> Self {
        Self { services }
    }

    async fn handle_season(&self, season: &Season) -> Result<()> {
        let folder_name = season.downloaded_folder_name.as_deref().ok_or_else(|| {
            EngineError::IncorrectWorkingReference(format!(
                "no downloaded folder for {}",
                season.title
            ))
        })?;
        let series = self
            .services
            .download_client
            .get_series_by_id(season.series_id)
            .await?;
        let season_folder = self.services.naming.season_folder_name(folder_name)?;

        info!(series = %series.title, path = %series.path, "Copying season");
        self.services
            .copier
            .copy_season(folder_name, &series.path, &season_folder)
            .await?;
        self.services
            .refresher
            .refresh_series(&series, season.queue_item_id)
            .await
    }

    async fn handle_episode(&self, record: &QueueRecord) -> Result<()> {
        let file_name = record.downloaded_name().ok_or_else(|| {
            EngineError::IncorrectWorkingReference(format!(
                "no output path for {}",
                record.title
            ))
        })?;
        let series = self
            .services
            .download_client
            .get_series_by_id(record.series_id)
            .await?;
        let season_folder = self.services.naming.season_folder_name(&record.title)?;

        self.services
            .copier
            .copy_episode(file_name, &series.path, &season_folder)
            .await?;
        self.services.refresher.refresh_series(&series, record.id).await
    }
}

#[async_trait]
impl Handler for FailedDownloadsHandler {
    async fn handle(&self) -> Result<()> {
        info!(job = "failed_downloads", "Scanning download client queue");
        let records = self.services.download_client.list_queue().await?;
        let grouped = group_by_title(records);
        info!(
            job = "failed_downloads",
            seasons = grouped.seasons.len(),
            episodes = grouped.episodes.len(),
            "Grouped failed downloads"
        );

        for season in &grouped.seasons {
            match self.handle_season(season).await {
                Ok(()) => info!(job = "failed_downloads", title = %season.title, "Season handled"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => error!(
                    job = "failed_downloads",
                    title = %season.title,
                    error = %e,
                    "Could not handle the season"
                ),
            }
        }

        for record in &grouped.episodes {
            match self.handle_episode(record).await {
                Ok(()) => info!(job = "failed_downloads", title = %record.title, "Episode handled"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => error!(
                    job = "failed_downloads",
                    title = %record.title,
                    error = %e,
                    "Could not handle the episode"
                ),
            }
        }
        Ok(())
    }
}
