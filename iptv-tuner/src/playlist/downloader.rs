//! Playlist download.

use std::time::Duration;

use log::info;
use reqwest::redirect::Policy;
use thiserror::Error;

/// Default total timeout of a playlist download.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Playlist error types.
#[derive(Error, Debug)]
pub enum PlaylistError {
    #[error("Playlist URL is not configured")]
    NotConfigured,

    #[error("Timed out downloading playlist from {0}")]
    Timeout(String),

    #[error("Playlist server answered with status {0}")]
    Status(u16),

    #[error("Failed to download playlist: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Settings(#[from] crate::settings::SettingsError),
}

/// Fetches playlist text over HTTP.
#[derive(Debug, Clone)]
pub struct M3uDownloader {
    timeout: Duration,
}

impl Default for M3uDownloader {
    fn default() -> Self {
        Self::new(DOWNLOAD_TIMEOUT)
    }
}

impl M3uDownloader {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn download(&self, url: &str, user_agent: &str) -> Result<String, PlaylistError> {
        if url.trim().is_empty() {
            return Err(PlaylistError::NotConfigured);
        }

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(self.timeout)
            .redirect(Policy::limited(10))
            .build()?;

        info!("Downloading playlist from: {}", url);
        let response = client.get(url).send().await.map_err(|e| classify(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PlaylistError::Status(status.as_u16()));
        }

        let content = response.text().await.map_err(|e| classify(url, e))?;
        info!("Downloaded {} bytes", content.len());
        Ok(content)
    }
}

fn classify(url: &str, err: reqwest::Error) -> PlaylistError {
    if err.is_timeout() {
        PlaylistError::Timeout(url.to_string())
    } else {
        PlaylistError::Http(err)
    }
}
