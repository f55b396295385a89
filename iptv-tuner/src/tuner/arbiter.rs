//! Single-tuner session arbitration.
//!
//! The emulated device has one tuner, and most IPTV providers allow one
//! connection per account. [`StreamArbiter`] owns the only upstream session
//! and runs every admission as one critical section:
//!
//! ```text
//! lock ─► terminate previous session ─► kill-switch delay ─► probe ─► install ─► unlock
//! ```
//!
//! Concurrent requests queue on the lock, so two upstream connections are
//! never open at the same time and admissions never interleave.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::prober::{probe, ProbeResult, UpstreamFault, UpstreamTimeouts};
use super::relay::{LiveStream, Relay, RelayEnd, RelayStats};

/// How long a preempted relay gets to release its upstream before it is aborted.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Maximum URL length in log lines.
const LOG_URL_LEN: usize = 50;

/// One stream request, with tuning values read from settings at request time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub url: String,
    pub user_agent: String,
    pub kill_delay: Duration,
    pub read_timeout: Duration,
}

/// Result of a stream request.
pub enum StreamOutcome {
    /// Upstream accepted; the session is installed and relaying.
    Live(LiveStream),
    /// Upstream answered 4xx/5xx before any byte was relayed.
    Unavailable(u16),
    /// Connecting or waiting for the response head failed.
    Fault(UpstreamFault),
}

/// Failure while tearing down a session. Logged, never propagated.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("Relay of session {0} did not stop within {1:?}, aborted")]
    Timeout(u64, Duration),

    #[error("Relay of session {0} failed: {1}")]
    Join(u64, String),
}

/// Point-in-time view of the active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub id: u64,
    pub url: String,
    pub opened_at: String,
    pub bytes_relayed: u64,
    pub chunks_relayed: u64,
}

/// What the arbiter is doing right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ArbiterStatus {
    Idle,
    /// An admission holds the lock (terminating, waiting or probing).
    Switching,
    Active(SessionSnapshot),
}

struct ActiveSession {
    id: u64,
    url: String,
    opened_at: DateTime<Local>,
    cancel: CancellationToken,
    relay: JoinHandle<RelayEnd>,
    stats: Arc<RelayStats>,
}

impl ActiveSession {
    /// The relay has already dropped its upstream.
    fn is_released(&self) -> bool {
        self.relay.is_finished()
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            url: self.url.clone(),
            opened_at: self.opened_at.to_rfc3339(),
            bytes_relayed: self.stats.bytes(),
            chunks_relayed: self.stats.chunks(),
        }
    }

    /// Stop the relay and wait until the upstream body and client are dropped.
    async fn terminate(self, grace: Duration) -> Result<RelayEnd, CleanupError> {
        self.cancel.cancel();
        let mut relay = self.relay;
        match tokio::time::timeout(grace, &mut relay).await {
            Ok(Ok(end)) => Ok(end),
            Ok(Err(e)) => Err(CleanupError::Join(self.id, e.to_string())),
            Err(_) => {
                relay.abort();
                // An aborted task drops its future, and with it the upstream.
                let _ = relay.await;
                Err(CleanupError::Timeout(self.id, grace))
            }
        }
    }
}

/// Owner of the single upstream session.
pub struct StreamArbiter {
    session: Mutex<Option<ActiveSession>>,
    timeouts: UpstreamTimeouts,
    next_id: AtomicU64,
}

impl StreamArbiter {
    /// `timeouts.read` is replaced per request by [`StreamRequest::read_timeout`].
    pub fn new(timeouts: UpstreamTimeouts) -> Self {
        Self {
            session: Mutex::new(None),
            timeouts,
            next_id: AtomicU64::new(0),
        }
    }

    /// Replace the active session with a stream from `request.url`.
    pub async fn request_stream(&self, request: StreamRequest) -> StreamOutcome {
        let mut slot = self.session.lock().await;

        if let Some(previous) = slot.take() {
            if previous.is_released() {
                debug!("[Session {}] Already released, nothing to terminate", previous.id);
            } else {
                info!("[Session {}] Terminating for new request", previous.id);
                let id = previous.id;
                match previous.terminate(TERMINATE_GRACE).await {
                    Ok(end) => debug!("[Session {}] Terminated ({:?})", id, end),
                    Err(e) => warn!("Session cleanup failed: {}", e),
                }
            }
        }

        if !request.kill_delay.is_zero() {
            debug!("Kill-switch delay: {}ms", request.kill_delay.as_millis());
            tokio::time::sleep(request.kill_delay).await;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let timeouts = self.timeouts.with_read(request.read_timeout);
        info!("[Session {}] Probing {}", id, short_url(&request.url));

        match probe(&request.url, &request.user_agent, &timeouts).await {
            Ok(ProbeResult::Accepted(upstream)) => {
                info!(
                    "[Session {}] Upstream accepted (status {}, {})",
                    id,
                    upstream.status,
                    upstream.content_type.as_deref().unwrap_or("no content-type")
                );
                let cancel = CancellationToken::new();
                let stats = Arc::new(RelayStats::default());
                let (relay, stream) =
                    Relay::new(id, upstream, request.read_timeout, cancel.clone(), Arc::clone(&stats)).spawn();
                *slot = Some(ActiveSession {
                    id,
                    url: request.url,
                    opened_at: Local::now(),
                    cancel,
                    relay,
                    stats,
                });
                StreamOutcome::Live(stream)
            }
            Ok(ProbeResult::Rejected(status)) => {
                warn!("[Session {}] Upstream rejected with status {}", id, status);
                StreamOutcome::Unavailable(status)
            }
            Err(fault) => {
                error!("[Session {}] Upstream fault: {}", id, fault);
                StreamOutcome::Fault(fault)
            }
        }
    }

    /// Current state, without waiting for an admission in progress.
    pub fn status(&self) -> ArbiterStatus {
        match self.session.try_lock() {
            Err(_) => ArbiterStatus::Switching,
            Ok(slot) => match slot.as_ref() {
                Some(session) if !session.is_released() => ArbiterStatus::Active(session.snapshot()),
                _ => ArbiterStatus::Idle,
            },
        }
    }

    /// Terminate the active session, if any.
    pub async fn shutdown(&self) {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.take() {
            let id = session.id;
            if let Err(e) = session.terminate(TERMINATE_GRACE).await {
                warn!("Session cleanup failed: {}", e);
            }
            info!("[Session {}] Closed on shutdown", id);
        }
    }
}

fn short_url(url: &str) -> String {
    match url.char_indices().nth(LOG_URL_LEN) {
        Some((cut, _)) => format!("{}...", &url[..cut]),
        None => url.to_string(),
    }
}
