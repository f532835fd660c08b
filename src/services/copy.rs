//! Copy downloads from the cloud downloads folder into the series library
//!
//! Library layout: `<series root>/<series folder>/<season folder>/<file>`. The
//! series folder is named after the last segment of the download client's series
//! path; missing series and season folders are created on the fly.

use std::sync::Arc;

use tracing::{debug, info};

use super::storage::{RemoteElement, RemoteStorage};
use crate::error::EngineError;

pub struct CopyService {
    storage: Arc<dyn RemoteStorage>,
    downloads_root: String,
    series_root: String,
}

impl CopyService {
    pub fn new(storage: Arc<dyn RemoteStorage>, downloads_root: String, series_root: String) -> Self {
        Self {
            storage,
            downloads_root,
            series_root,
        }
    }

    /// Look for a finished download (file or folder) by name.
    pub async fn find_download(&self, name: &str) -> Result<Option<RemoteElement>, EngineError> {
        self.storage.lookup(&self.downloads_root, name).await
    }

    /// Files inside a downloaded folder.
    pub async fn download_files(&self, folder: &RemoteElement) -> Result<Vec<RemoteElement>, EngineError> {
        let children = self.storage.list_children(&folder.id).await?;
        Ok(children.into_iter().filter(|c| !c.is_folder).collect())
    }

    pub async fn copy_episode(
        &self,
        file_name: &str,
        series_path: &str,
        season_folder: &str,
    ) -> Result<(), EngineError> {
        let source = self.require_download(file_name).await?;
        let destination = self.season_destination(series_path, season_folder).await?;

        self.storage.copy_file(&source, &destination.id).await?;
        info!(file = %file_name, destination = %destination.id, "Copied episode");
        Ok(())
    }

    /// Copy every file of a downloaded season folder.
    pub async fn copy_season(
        &self,
        folder_name: &str,
        series_path: &str,
        season_folder: &str,
    ) -> Result<(), EngineError> {
        let source = self.require_download(folder_name).await?;
        let files = self.download_files(&source).await?;
        let destination = self.season_destination(series_path, season_folder).await?;

        for file in &files {
            self.storage.copy_file(file, &destination.id).await?;
            debug!(file = %file.name, "Copied season file");
        }
        info!(
            folder = %folder_name,
            destination = %destination.id,
            file_count = files.len(),
            "Copied season"
        );
        Ok(())
    }

    /// Copy one downloaded video into the folder at `destination_path`.
    ///
    /// The last path segment names the destination folder; it is created under
    /// its parent when missing.
    pub async fn copy_video_file(&self, file_name: &str, destination_path: &str) -> Result<(), EngineError> {
        let source = self.require_download(file_name).await?;
        let (parent, folder_name) = destination_path
            .trim_end_matches(['/', '\\'])
            .rsplit_once(['/', '\\'])
            .filter(|(parent, name)| !parent.is_empty() && !name.is_empty())
            .ok_or_else(|| {
                EngineError::IncorrectWorkingReference(format!("invalid destination path: {destination_path}"))
            })?;

        let destination = self.get_or_create_folder(parent, folder_name).await?;
        self.storage.copy_file(&source, &destination.id).await?;
        info!(
            file = %file_name,
            file_id = %source.id,
            destination = %destination_path,
            destination_id = %destination.id,
            "Copied video file"
        );
        Ok(())
    }

    async fn require_download(&self, name: &str) -> Result<RemoteElement, EngineError> {
        self.find_download(name)
            .await?
            .ok_or_else(|| EngineError::NoElementFound(format!("download {name}")))
    }

    async fn season_destination(
        &self,
        series_path: &str,
        season_folder: &str,
    ) -> Result<RemoteElement, EngineError> {
        let series_name = series_path
            .trim_end_matches(['/', '\\'])
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                EngineError::IncorrectWorkingReference(format!("invalid series path: {series_path}"))
            })?;

        let series_folder = self.get_or_create_folder(&self.series_root, series_name).await?;
        self.get_or_create_folder(&series_folder.id, season_folder).await
    }

    async fn get_or_create_folder(&self, parent_id: &str, name: &str) -> Result<RemoteElement, EngineError> {
        if let Some(folder) = self.storage.lookup(parent_id, name).await? {
            return Ok(folder);
        }
        info!(parent = %parent_id, folder = %name, "Creating folder");
        self.storage.create_folder(parent_id, name).await
    }
}
