//! Playlist model definitions.

use hdhr_protocol::LineupEntry;
use serde::{Deserialize, Serialize};

/// Category used when an entry has no `group-title`.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Channel parsed from the playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Stable identifier used in stream URLs (`ch1`, `ch2`, ...).
    pub id: String,
    pub name: String,
    pub tvg_name: String,
    /// Upstream playback URL.
    pub url: String,
    pub category: String,
    pub logo: Option<String>,
    pub guide_number: String,
}

impl Channel {
    pub fn lineup_entry(&self, base_url: &str) -> LineupEntry {
        LineupEntry::new(&self.guide_number, &self.name, base_url, &self.id)
    }
}

/// Kind of content a category carries, guessed from its URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Live,
    Movie,
    Series,
}

impl ContentType {
    /// Xtream-style URLs carry `/movie/` or `/series/` path segments.
    pub fn detect(url: &str) -> Self {
        let url = url.to_lowercase();
        if url.contains("/movie/") {
            ContentType::Movie
        } else if url.contains("/series/") {
            ContentType::Series
        } else {
            ContentType::Live
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            ContentType::Live => "\u{1F4E1}",
            ContentType::Movie => "\u{1F3AC}",
            ContentType::Series => "\u{1F4FA}",
        }
    }
}

/// Category with its content type, for the management UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    /// Name followed by the content type emoji.
    pub display: String,
}

impl CategoryInfo {
    pub fn new(name: &str, content_type: ContentType) -> Self {
        Self {
            name: name.to_string(),
            content_type,
            display: format!("{} {}", name, content_type.emoji()),
        }
    }
}
