//! Post-copy refresh: let the download client and the media server know
//!
//! After a copy the download client rescans the series, its queue item is
//! dropped, and the media server rescans the series folder. The download client
//! and the media server mount the library at different paths, so the series
//! path is rewritten from one prefix to the other.

use std::sync::Arc;

use tracing::info;

use super::download_client::{DownloadClient, Series};
use super::media_server::MediaServer;
use crate::error::EngineError;

pub struct SeriesRefresher {
    download_client: Arc<dyn DownloadClient>,
    media_server: Arc<dyn MediaServer>,
    path_from: String,
    path_to: String,
}

impl SeriesRefresher {
    pub fn new(
        download_client: Arc<dyn DownloadClient>,
        media_server: Arc<dyn MediaServer>,
        path_from: String,
        path_to: String,
    ) -> Self {
        Self {
            download_client,
            media_server,
            path_from,
            path_to,
        }
    }

    pub async fn refresh_series(&self, series: &Series, queue_item_id: i64) -> Result<(), EngineError> {
        self.download_client.refresh_series(series.id).await?;
        self.download_client.delete_queue_item(queue_item_id).await?;

        let media_path = self.media_server_path(&series.path);
        self.media_server.rescan_path(&media_path).await?;

        info!(series = %series.title, queue_item_id, path = %media_path, "Series refreshed");
        Ok(())
    }

    /// Rewrite a download-client path into the media server's view of the library.
    ///
    /// Only whole path segments are matched: with a `/tv` prefix, `/tvshows/X` is
    /// left alone.
    pub fn media_server_path(&self, series_path: &str) -> String {
        let from = self.path_from.trim_end_matches('/');
        if from.is_empty() {
            return series_path.to_string();
        }
        match series_path.strip_prefix(from) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => {
                format!("{}{}", self.path_to.trim_end_matches('/'), rest)
            }
            _ => series_path.to_string(),
        }
    }
}
