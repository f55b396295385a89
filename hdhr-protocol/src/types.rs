//! Document types served to the media server.

use serde::{Deserialize, Serialize};

/// Model number advertised in the discovery document.
pub const MODEL_NUMBER: &str = "HDHR4-2US";

/// Firmware name advertised in the discovery document.
pub const FIRMWARE_NAME: &str = "hdhomerun4_atsc";

/// Firmware version advertised in the discovery document.
pub const FIRMWARE_VERSION: &str = "20190621";

/// Static auth token. Clients only check that it is present.
pub const DEVICE_AUTH: &str = "test1234";

/// Exactly one stream can be served at a time.
pub const TUNER_COUNT: u32 = 1;

/// Lineup source reported to clients.
pub const LINEUP_SOURCE: &str = "Cable";

/// MIME type of the stream endpoint.
pub const STREAM_CONTENT_TYPE: &str = "video/mpeg";

/// Identity of the emulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub friendly_name: String,
}

impl DeviceIdentity {
    pub fn new(device_id: impl Into<String>, friendly_name: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            friendly_name: friendly_name.into(),
        }
    }
}

/// `/discover.json` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiscoverResponse {
    pub friendly_name: String,
    pub model_number: String,
    pub firmware_name: String,
    pub tuner_count: u32,
    pub firmware_version: String,
    #[serde(rename = "DeviceID")]
    pub device_id: String,
    pub device_auth: String,
    #[serde(rename = "BaseURL")]
    pub base_url: String,
    #[serde(rename = "LineupURL")]
    pub lineup_url: String,
}

impl DiscoverResponse {
    /// Build the discovery document for a device reachable at `base_url`.
    pub fn new(identity: &DeviceIdentity, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/');
        Self {
            friendly_name: identity.friendly_name.clone(),
            model_number: MODEL_NUMBER.to_string(),
            firmware_name: FIRMWARE_NAME.to_string(),
            tuner_count: TUNER_COUNT,
            firmware_version: FIRMWARE_VERSION.to_string(),
            device_id: identity.device_id.clone(),
            device_auth: DEVICE_AUTH.to_string(),
            base_url: base_url.to_string(),
            lineup_url: format!("{}/lineup.json", base_url),
        }
    }
}

/// `/lineup_status.json` document.
///
/// The playlist is static from the client's point of view, so a scan is never
/// in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LineupStatus {
    pub scan_in_progress: u8,
    pub scan_possible: u8,
    pub source: String,
    pub source_list: Vec<String>,
}

impl Default for LineupStatus {
    fn default() -> Self {
        Self {
            scan_in_progress: 0,
            scan_possible: 1,
            source: LINEUP_SOURCE.to_string(),
            source_list: vec![LINEUP_SOURCE.to_string()],
        }
    }
}

/// One entry of `/lineup.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LineupEntry {
    pub guide_number: String,
    pub guide_name: String,
    #[serde(rename = "URL")]
    pub url: String,
}

impl LineupEntry {
    /// Build a lineup entry pointing at this device's stream endpoint.
    pub fn new(guide_number: &str, name: &str, base_url: &str, channel_id: &str) -> Self {
        Self {
            guide_number: guide_number.to_string(),
            guide_name: format!("{} {}", guide_number, name),
            url: stream_url(base_url, channel_id),
        }
    }
}

/// URL of the stream endpoint for a channel.
pub fn stream_url(base_url: &str, channel_id: &str) -> String {
    format!("{}/stream/{}", base_url.trim_end_matches('/'), channel_id)
}
