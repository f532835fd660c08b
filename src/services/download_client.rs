//! Download-client (Sonarr) API client
//!
//! Only the handful of endpoints the pipeline needs: the queue, series lookup,
//! queue item removal and the series refresh command.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::EngineError;

/// One entry of the download client's queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    /// Queue item id.
    pub id: i64,
    pub series_id: i64,
    pub title: String,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub download_id: Option<String>,
}

impl QueueRecord {
    /// Last path segment of the output path: the downloaded file or folder name.
    pub fn downloaded_name(&self) -> Option<&str> {
        self.output_path
            .as_deref()
            .map(|path| path.rsplit(['/', '\\']).next().unwrap_or(path))
            .filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    pub id: i64,
    pub title: String,
    /// Library path of the series as the download client sees it.
    pub path: String,
}

#[async_trait]
pub trait DownloadClient: Send + Sync {
    async fn list_queue(&self) -> Result<Vec<QueueRecord>, EngineError>;

    async fn get_series_by_id(&self, id: i64) -> Result<Series, EngineError>;

    async fn delete_queue_item(&self, id: i64) -> Result<(), EngineError>;

    async fn refresh_series(&self, id: i64) -> Result<(), EngineError>;
}

#[derive(Debug, Deserialize)]
struct QueuePage {
    records: Vec<QueueRecord>,
}

/// Sonarr v3 API client
pub struct SonarrClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SonarrClient {
    const SERVICE: &'static str = "sonarr";
    const QUEUE_PAGE_SIZE: u32 = 1000;

    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v3/{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, EngineError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        Err(EngineError::Api {
            service: Self::SERVICE,
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl DownloadClient for SonarrClient {
    async fn list_queue(&self) -> Result<Vec<QueueRecord>, EngineError> {
        let response = self
            .client
            .get(self.url("queue"))
            .header("X-Api-Key", &self.api_key)
            .query(&[("page", 1), ("pageSize", Self::QUEUE_PAGE_SIZE)])
            .send()
            .await?;
        let page: QueuePage = Self::check(response).await?.json().await?;

        debug!(count = page.records.len(), "Sonarr queue retrieved");
        Ok(page.records)
    }

    async fn get_series_by_id(&self, id: i64) -> Result<Series, EngineError> {
        let response = self
            .client
            .get(self.url(&format!("series/{id}")))
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(EngineError::NoElementFound(format!("series {id}")));
        }
        let series: Series = Self::check(response).await?.json().await?;
        Ok(series)
    }

    async fn delete_queue_item(&self, id: i64) -> Result<(), EngineError> {
        let response = self
            .client
            .delete(self.url(&format!("queue/{id}")))
            .header("X-Api-Key", &self.api_key)
            .query(&[("removeFromClient", "false")])
            .send()
            .await?;
        Self::check(response).await?;
        info!(queue_item_id = id, "Removed queue element");
        Ok(())
    }

    async fn refresh_series(&self, id: i64) -> Result<(), EngineError> {
        let response = self
            .client
            .post(self.url("command"))
            .header("X-Api-Key", &self.api_key)
            .json(&serde_json::json!({ "name": "RefreshSeries", "seriesId": id }))
            .send()
            .await?;
        Self::check(response).await?;
        info!(series_id = id, "Requested series refresh");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(output_path: Option<&str>) -> QueueRecord {
        QueueRecord {
            id: 1,
            series_id: 2,
            title: "Show S01E01".into(),
            output_path: output_path.map(String::from),
            download_id: None,
        }
    }

    #[test]
    fn downloaded_name_is_last_segment() {
        assert_eq!(
            record(Some("/downloads/complete/Show.S01E01.mkv")).downloaded_name(),
            Some("Show.S01E01.mkv")
        );
        assert_eq!(record(Some("C:\\dl\\Show.S02")).downloaded_name(), Some("Show.S02"));
        assert_eq!(record(Some("Show.S02")).downloaded_name(), Some("Show.S02"));
        assert_eq!(record(Some("/downloads/")).downloaded_name(), None);
        assert_eq!(record(None).downloaded_name(), None);
    }

    #[test]
    fn queue_page_deserializes_from_api_format() {
        let json = r#"{
            "page": 1,
            "pageSize": 1000,
            "totalRecords": 1,
            "records": [{
                "id": 99,
                "seriesId": 12,
                "episodeId": 345,
                "title": "Show.S02E03.1080p.WEB-DL",
                "status": "completed",
                "outputPath": "/downloads/Show.S02E03.1080p.WEB-DL.mkv",
                "downloadId": "SABnzbd_nzo_abc"
            }]
        }"#;
        let page: QueuePage = serde_json::from_str(json).unwrap();
        assert_eq!(page.records.len(), 1);
        let record = &page.records[0];
        assert_eq!(record.id, 99);
        assert_eq!(record.series_id, 12);
        assert_eq!(record.download_id.as_deref(), Some("SABnzbd_nzo_abc"));
        assert_eq!(record.downloaded_name(), Some("Show.S02E03.1080p.WEB-DL.mkv"));
    }

    #[test]
    fn series_deserializes_ignoring_extra_fields() {
        let json = r#"{"id": 12, "title": "Show", "path": "/tv/Show", "monitored": true}"#;
        let series: Series = serde_json::from_str(json).unwrap();
        assert_eq!(series.path, "/tv/Show");
    }

    #[test]
    fn base_url_is_normalized() {
        let client = SonarrClient::new("http://sonarr:8989/".into(), "key".into());
        assert_eq!(client.url("queue"), "http://sonarr:8989/api/v3/queue");
    }
}
