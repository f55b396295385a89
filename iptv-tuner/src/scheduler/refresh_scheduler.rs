//! Periodic playlist refresh.
//!
//! # How It Works
//!
//! 1. The scheduler runs as a background task
//! 2. It refreshes the playlist once at startup
//! 3. It then sleeps for `update_interval_hours`, re-read from settings each
//!    cycle, and refreshes again
//! 4. [`RefreshScheduler::reschedule`] wakes it to recompute the deadline after
//!    the interval was edited

use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::{Mutex, Notify};
use tokio::time::{sleep_until, Instant};

use crate::playlist::{PlaylistError, PlaylistRefresher};
use crate::settings::SettingsStore;

/// Refresh scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Scheduler is running.
    Running,
    /// Scheduler is stopped.
    Stopped,
}

/// Background playlist refresher.
pub struct RefreshScheduler {
    refresher: Arc<PlaylistRefresher>,
    settings: Arc<SettingsStore>,
    state: Mutex<SchedulerState>,
    wake: Notify,
}

impl RefreshScheduler {
    pub fn new(refresher: Arc<PlaylistRefresher>, settings: Arc<SettingsStore>) -> Self {
        Self {
            refresher,
            settings,
            state: Mutex::new(SchedulerState::Running),
            wake: Notify::new(),
        }
    }

    /// Start the scheduler background task.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        info!("RefreshScheduler: Starting");
        self.refresh_once().await;
        let mut last_run = Instant::now();

        loop {
            if *self.state.lock().await == SchedulerState::Stopped {
                break;
            }

            let interval = self.settings.snapshot().update_interval();
            let deadline = last_run + interval;
            debug!(
                "RefreshScheduler: Next refresh in {}s",
                deadline.saturating_duration_since(Instant::now()).as_secs()
            );

            tokio::select! {
                _ = sleep_until(deadline) => {
                    self.refresh_once().await;
                    last_run = Instant::now();
                }
                _ = self.wake.notified() => {
                    debug!("RefreshScheduler: Woken, recomputing deadline");
                }
            }
        }

        info!("RefreshScheduler: Stopped");
    }

    async fn refresh_once(&self) {
        match self.refresher.refresh().await {
            Ok(summary) => info!(
                "RefreshScheduler: Refresh complete: {} channels published",
                summary.published
            ),
            Err(PlaylistError::NotConfigured) => debug!("RefreshScheduler: No playlist configured"),
            Err(e) => error!("RefreshScheduler: Refresh failed: {}", e),
        }
    }

    /// Recompute the next deadline from the current settings.
    pub fn reschedule(&self) {
        self.wake.notify_one();
    }

    /// Stop the scheduler.
    pub async fn stop(&self) {
        *self.state.lock().await = SchedulerState::Stopped;
        self.wake.notify_one();
        info!("RefreshScheduler: Stop requested");
    }

    #[cfg(test)]
    pub async fn state(&self) -> SchedulerState {
        *self.state.lock().await
    }
}
