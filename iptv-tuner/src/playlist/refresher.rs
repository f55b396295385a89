//! Download, parse and publish the playlist.

use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;

use super::downloader::{M3uDownloader, PlaylistError};
use super::m3u::parse_m3u;
use super::store::ChannelStore;
use crate::settings::{SettingsPatch, SettingsStore};

/// Result of a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    /// Channels in the playlist before filtering.
    pub parsed: usize,
    /// Channels published.
    pub published: usize,
    pub categories: usize,
    /// Selected categories dropped because the playlist no longer has them.
    pub orphans_removed: Vec<String>,
}

/// Refreshes the published lineup from the configured playlist.
pub struct PlaylistRefresher {
    settings: Arc<SettingsStore>,
    channels: Arc<ChannelStore>,
    downloader: M3uDownloader,
}

impl PlaylistRefresher {
    pub fn new(settings: Arc<SettingsStore>, channels: Arc<ChannelStore>, downloader: M3uDownloader) -> Self {
        Self {
            settings,
            channels,
            downloader,
        }
    }

    /// Replace the lineup. On error the previous lineup stays published.
    pub async fn refresh(&self) -> Result<RefreshSummary, PlaylistError> {
        let settings = self.settings.snapshot();
        if settings.m3u_url.is_empty() {
            warn!("Playlist URL not configured, skipping refresh");
            return Err(PlaylistError::NotConfigured);
        }

        let content = self.downloader.download(&settings.m3u_url, &settings.user_agent).await?;
        let playlist = parse_m3u(&content);
        let parsed = playlist.channels.len();

        let selected = &settings.selected_categories;
        let (valid, orphans): (Vec<String>, Vec<String>) = selected
            .iter()
            .cloned()
            .partition(|category| playlist.categories.contains_key(category));

        let categories = playlist.categories.len();
        let lineup = playlist.into_lineup(selected);
        let published = lineup.channels.len();
        self.channels.publish(lineup);

        if !orphans.is_empty() {
            info!("Cleaning up {} orphan categories: {:?}", orphans.len(), orphans);
            self.settings
                .update(&SettingsPatch {
                    selected_categories: Some(valid),
                    ..Default::default()
                })
                .await?;
        }

        info!("Playlist refresh complete: {} channels loaded", published);
        Ok(RefreshSummary {
            parsed,
            published,
            categories,
            orphans_removed: orphans,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuner::testing::TestUpstream;

    async fn setup(server: &TestUpstream, path: &str, selected: Vec<String>) -> (tempfile::TempDir, PlaylistRefresher, Arc<SettingsStore>, Arc<ChannelStore>) {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(SettingsStore::load_or_create(dir.path().join("settings.json")).unwrap());
        settings
            .update(&SettingsPatch {
                m3u_url: Some(server.url(path)),
                selected_categories: Some(selected),
                ..Default::default()
            })
            .await
            .unwrap();
        let channels = Arc::new(ChannelStore::new());
        let refresher = PlaylistRefresher::new(Arc::clone(&settings), Arc::clone(&channels), M3uDownloader::default());
        (dir, refresher, settings, channels)
    }

    #[tokio::test]
    async fn test_refresh_publishes_and_cleans_orphans() {
        let server = TestUpstream::start().await;
        let (_dir, refresher, settings, channels) =
            setup(&server, "/playlist.m3u", vec!["Documentary".into(), "Gone".into()]).await;

        let summary = refresher.refresh().await.unwrap();
        assert_eq!(summary.parsed, 3);
        assert_eq!(summary.published, 2);
        assert_eq!(summary.orphans_removed, vec!["Gone".to_string()]);
        assert_eq!(channels.len(), 2);
        assert_eq!(settings.snapshot().selected_categories, vec!["Documentary".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_lineup() {
        let server = TestUpstream::start().await;
        let (_dir, refresher, settings, channels) = setup(&server, "/playlist.m3u", Vec::new()).await;
        refresher.refresh().await.unwrap();
        assert_eq!(channels.len(), 3);

        settings
            .update(&SettingsPatch {
                m3u_url: Some(server.url("/status/500")),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(matches!(refresher.refresh().await, Err(PlaylistError::Status(500))));
        assert_eq!(channels.len(), 3);
    }
}
