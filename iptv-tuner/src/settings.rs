//! Runtime settings persisted as JSON.
//!
//! Readers take an immutable [`Settings`] snapshot; updates are validated,
//! written to disk through a temporary file and only then published, so a
//! reader never sees a half-applied change and the file on disk is never
//! truncated.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use hdhr_protocol::DeviceIdentity;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

/// Settings error types.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// One year.
const MAX_UPDATE_INTERVAL_HOURS: u64 = 24 * 365;
const MAX_KILL_SWITCH_DELAY_MS: u64 = 60_000;
const MAX_READ_TIMEOUT_SECONDS: u64 = 3600;

/// Settings editable at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Playlist URL. Empty means not configured.
    pub m3u_url: String,
    /// Categories to publish. Empty means all.
    pub selected_categories: Vec<String>,
    pub update_interval_hours: u64,
    /// Pause between closing one upstream and opening the next.
    pub kill_switch_delay_ms: u64,
    /// Per-chunk upstream read timeout.
    pub read_timeout_seconds: u64,
    pub user_agent: String,
    pub device_id: String,
    pub device_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            m3u_url: String::new(),
            selected_categories: Vec::new(),
            update_interval_hours: 12,
            kill_switch_delay_ms: 1000,
            read_timeout_seconds: 30,
            user_agent: "VLC/3.0.18 LibVLC/3.0.18".to_string(),
            device_id: "12345678".to_string(),
            device_name: "IPTV Tuner".to_string(),
        }
    }
}

impl Settings {
    pub fn kill_delay(&self) -> Duration {
        Duration::from_millis(self.kill_switch_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_hours.saturating_mul(3600))
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(self.device_id.clone(), self.device_name.clone())
    }

    pub fn validate(&self) -> Result<()> {
        if self.read_timeout_seconds == 0 || self.read_timeout_seconds > MAX_READ_TIMEOUT_SECONDS {
            return Err(SettingsError::Invalid(format!(
                "read_timeout_seconds must be between 1 and {}",
                MAX_READ_TIMEOUT_SECONDS
            )));
        }
        if self.update_interval_hours == 0 || self.update_interval_hours > MAX_UPDATE_INTERVAL_HOURS {
            return Err(SettingsError::Invalid(format!(
                "update_interval_hours must be between 1 and {}",
                MAX_UPDATE_INTERVAL_HOURS
            )));
        }
        if self.kill_switch_delay_ms > MAX_KILL_SWITCH_DELAY_MS {
            return Err(SettingsError::Invalid(format!(
                "kill_switch_delay_ms must be at most {}",
                MAX_KILL_SWITCH_DELAY_MS
            )));
        }
        if self.user_agent.trim().is_empty() {
            return Err(SettingsError::Invalid("user_agent must not be empty".into()));
        }
        Ok(())
    }
}

/// Partial update. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub m3u_url: Option<String>,
    pub selected_categories: Option<Vec<String>>,
    pub update_interval_hours: Option<u64>,
    pub kill_switch_delay_ms: Option<u64>,
    pub read_timeout_seconds: Option<u64>,
    pub user_agent: Option<String>,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
}

impl SettingsPatch {
    /// Names of the fields this patch sets.
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.m3u_url.is_some() {
            keys.push("m3u_url");
        }
        if self.selected_categories.is_some() {
            keys.push("selected_categories");
        }
        if self.update_interval_hours.is_some() {
            keys.push("update_interval_hours");
        }
        if self.kill_switch_delay_ms.is_some() {
            keys.push("kill_switch_delay_ms");
        }
        if self.read_timeout_seconds.is_some() {
            keys.push("read_timeout_seconds");
        }
        if self.user_agent.is_some() {
            keys.push("user_agent");
        }
        if self.device_id.is_some() {
            keys.push("device_id");
        }
        if self.device_name.is_some() {
            keys.push("device_name");
        }
        keys
    }

    fn apply(&self, base: &Settings) -> Settings {
        let mut next = base.clone();
        if let Some(v) = &self.m3u_url {
            next.m3u_url = v.trim().to_string();
        }
        if let Some(v) = &self.selected_categories {
            next.selected_categories = v.clone();
        }
        if let Some(v) = self.update_interval_hours {
            next.update_interval_hours = v;
        }
        if let Some(v) = self.kill_switch_delay_ms {
            next.kill_switch_delay_ms = v;
        }
        if let Some(v) = self.read_timeout_seconds {
            next.read_timeout_seconds = v;
        }
        if let Some(v) = &self.user_agent {
            next.user_agent = v.clone();
        }
        if let Some(v) = &self.device_id {
            next.device_id = v.clone();
        }
        if let Some(v) = &self.device_name {
            next.device_name = v.clone();
        }
        next
    }
}

/// Settings before and after an update.
#[derive(Debug, Clone)]
pub struct SettingsChange {
    pub before: Arc<Settings>,
    pub after: Arc<Settings>,
}

impl SettingsChange {
    /// The published channel list depends on what changed.
    pub fn lineup_changed(&self) -> bool {
        self.before.m3u_url != self.after.m3u_url
            || self.before.selected_categories != self.after.selected_categories
    }

    pub fn interval_changed(&self) -> bool {
        self.before.update_interval_hours != self.after.update_interval_hours
    }
}

/// File-backed settings with snapshot reads.
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<Arc<Settings>>,
    writer: Mutex<()>,
}

impl SettingsStore {
    /// Load settings from `path`, writing defaults if the file does not exist.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let settings = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let settings: Settings = serde_json::from_str(&content)?;
            settings.validate()?;
            info!("Loaded settings from {}", path.display());
            settings
        } else {
            let settings = Settings::default();
            write_atomic_sync(&path, &settings)?;
            info!("Created default settings at {}", path.display());
            settings
        };

        Ok(Self {
            path,
            current: RwLock::new(Arc::new(settings)),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current settings.
    pub fn snapshot(&self) -> Arc<Settings> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Validate, persist and publish a partial update.
    pub async fn update(&self, patch: &SettingsPatch) -> Result<SettingsChange> {
        let _writer = self.writer.lock().await;

        let before = self.snapshot();
        let after = Arc::new(patch.apply(&before));
        after.validate()?;

        if *after != *before {
            let json = serde_json::to_string_pretty(after.as_ref())?;
            let tmp = temp_path(&self.path);
            tokio::fs::write(&tmp, json).await?;
            tokio::fs::rename(&tmp, &self.path).await?;
            *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&after);
            info!("Settings updated: {:?}", patch.keys());
        } else {
            debug!("Settings update changed nothing");
        }

        Ok(SettingsChange { before, after })
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_atomic_sync(path: &Path, settings: &Settings) -> Result<()> {
    let json = serde_json::to_string_pretty(settings)?;
    let tmp = temp_path(path);
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
