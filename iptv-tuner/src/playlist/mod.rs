//! IPTV playlist handling.
//!
//! This module provides:
//! - [`M3uDownloader`]: Playlist download with the configured User-Agent
//! - [`m3u`]: Extended M3U parsing into [`Channel`]s
//! - [`ChannelStore`]: The published, immutable channel lineup
//! - [`PlaylistRefresher`]: Download, parse, filter and publish in one step

pub mod downloader;
pub mod m3u;
pub mod models;
pub mod refresher;
pub mod store;

pub use downloader::{M3uDownloader, PlaylistError};
pub use models::Channel;
pub use refresher::PlaylistRefresher;
pub use store::ChannelStore;
