//! Media server (Plex) client
//!
//! Only partial library scans are needed: after a copy lands, the series folder
//! is rescanned so new episodes show up without a full library refresh.

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use crate::error::EngineError;

#[async_trait]
pub trait MediaServer: Send + Sync {
    /// Rescan a single library path.
    async fn rescan_path(&self, path: &str) -> Result<(), EngineError>;
}

/// Plex Media Server client
pub struct PlexClient {
    client: Client,
    base_url: String,
    token: String,
    section_id: u32,
}

impl PlexClient {
    pub fn new(base_url: String, token: String, section_id: u32) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            section_id,
        }
    }

    fn refresh_url(&self) -> String {
        format!("{}/library/sections/{}/refresh", self.base_url, self.section_id)
    }
}

#[async_trait]
impl MediaServer for PlexClient {
    async fn rescan_path(&self, path: &str) -> Result<(), EngineError> {
        let response = self
            .client
            .get(self.refresh_url())
            .header("X-Plex-Token", &self.token)
            .query(&[("path", path)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(EngineError::Api {
                service: "plex",
                status: status.as_u16(),
                message,
            });
        }

        info!(path = %path, section = self.section_id, "Requested Plex library scan");
        Ok(())
    }
}
