//! Wire definitions for the HDHomeRun-compatible tuner surface.
//!
//! Media servers (Plex, Emby, Jellyfin) discover a network tuner by fetching a
//! handful of JSON documents from it and then pull MPEG-TS from one URL per
//! channel. This crate holds those documents and the status codes the stream
//! endpoint answers with.
//!
//! ```text
//! GET /discover.json        -> DiscoverResponse
//! GET /lineup_status.json   -> LineupStatus
//! GET /lineup.json          -> Vec<LineupEntry>
//! GET /stream/{channel_id}  -> video/mpeg | StreamErrorCode
//! ```
//!
//! # Example
//!
//! ```rust
//! use hdhr_protocol::{DeviceIdentity, DiscoverResponse, LineupEntry};
//!
//! let identity = DeviceIdentity::new("12345678", "IPTV Tuner");
//! let discover = DiscoverResponse::new(&identity, "http://tuner.local:5004");
//! assert_eq!(discover.lineup_url, "http://tuner.local:5004/lineup.json");
//!
//! let entry = LineupEntry::new("7", "Science Channel", "http://tuner.local:5004", "ch7");
//! assert_eq!(entry.guide_name, "7 Science Channel");
//! ```

pub mod error;
pub mod types;

pub use error::*;
pub use types::*;
