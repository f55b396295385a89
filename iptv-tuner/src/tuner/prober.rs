//! Upstream connection setup and response classification.
//!
//! A probe issues the stream request and inspects the status line before
//! anything is handed to the client, so a rejected upstream can be told apart
//! from one that fails after bytes started flowing.

use std::time::Duration;

use log::debug;
use reqwest::redirect::Policy;
use thiserror::Error;

/// Maximum number of redirects followed before the probe gives up.
pub const MAX_REDIRECTS: usize = 10;

/// Timeouts applied to one upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamTimeouts {
    /// TCP/TLS connection establishment.
    pub connect: Duration,
    /// Per-chunk read while relaying; also bounds the wait for response headers.
    pub read: Duration,
    /// Added to the header deadline of a probe; reqwest has no separate write timeout.
    pub write: Duration,
    /// How long an idle pooled connection is kept.
    pub pool: Duration,
}

impl Default for UpstreamTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(30),
            write: Duration::from_secs(10),
            pool: Duration::from_secs(10),
        }
    }
}

impl UpstreamTimeouts {
    /// Same timeouts with a different read timeout.
    pub fn with_read(self, read: Duration) -> Self {
        Self { read, ..self }
    }

    /// Upper bound for receiving the response head of a probe.
    pub fn probe_deadline(&self) -> Duration {
        self.connect.saturating_add(self.write).saturating_add(self.read)
    }
}

/// Transport-level failure talking to the upstream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamFault {
    #[error("Upstream timed out: {0}")]
    Timeout(String),

    #[error("Failed to connect to upstream: {0}")]
    Connect(String),

    #[error("Upstream redirect loop: {0}")]
    RedirectLoop(String),

    #[error("Upstream transport error: {0}")]
    Transport(String),

    #[error("Invalid upstream request: {0}")]
    InvalidRequest(String),
}

impl UpstreamFault {
    /// Classify a reqwest error at the point where it occurred.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let detail = err.to_string();
        if err.is_timeout() {
            UpstreamFault::Timeout(detail)
        } else if err.is_redirect() {
            UpstreamFault::RedirectLoop(detail)
        } else if err.is_connect() {
            UpstreamFault::Connect(detail)
        } else if err.is_builder() {
            UpstreamFault::InvalidRequest(detail)
        } else {
            UpstreamFault::Transport(detail)
        }
    }

    /// Returns true if the upstream did not answer in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, UpstreamFault::Timeout(_))
    }
}

/// Coarse class of an upstream HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// [200, 400): the stream can be relayed.
    Success,
    /// [400, 500): the upstream refused us.
    ClientError,
    /// [500, 600): the upstream is broken.
    ServerError,
    /// Anything else.
    Unexpected,
}

impl StatusClass {
    /// Returns true if the upstream explicitly rejected the request.
    pub fn is_rejection(self) -> bool {
        matches!(self, StatusClass::ClientError | StatusClass::ServerError)
    }
}

/// Classify an upstream status code.
pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=399 => StatusClass::Success,
        400..=499 => StatusClass::ClientError,
        500..=599 => StatusClass::ServerError,
        _ => StatusClass::Unexpected,
    }
}

/// An upstream that accepted the request, with its body still unread.
///
/// The client is kept next to the response: it owns the connection pool, so
/// dropping both closes the upstream connection.
pub struct Upstream {
    pub client: reqwest::Client,
    pub response: reqwest::Response,
    pub status: u16,
    pub content_type: Option<String>,
}

/// Result of a probe that reached the upstream.
pub enum ProbeResult {
    /// Status in [200, 400).
    Accepted(Upstream),
    /// Status in [400, 600). Body and connection are already closed.
    Rejected(u16),
}

/// Build a dedicated client for one upstream session.
pub fn build_client(user_agent: &str, timeouts: &UpstreamTimeouts) -> Result<reqwest::Client, UpstreamFault> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .connect_timeout(timeouts.connect)
        .pool_idle_timeout(timeouts.pool)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .build()
        .map_err(|e| UpstreamFault::from_reqwest(&e))
}

/// Issue the stream request and classify the response head.
pub async fn probe(
    url: &str,
    user_agent: &str,
    timeouts: &UpstreamTimeouts,
) -> Result<ProbeResult, UpstreamFault> {
    let client = build_client(user_agent, timeouts)?;
    let deadline = timeouts.probe_deadline();

    let response = match tokio::time::timeout(deadline, client.get(url).send()).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => return Err(UpstreamFault::from_reqwest(&e)),
        Err(_) => {
            return Err(UpstreamFault::Timeout(format!(
                "no response headers within {}ms",
                deadline.as_millis()
            )))
        }
    };

    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    debug!(
        "Probe answered: status={}, content-type={}",
        status,
        content_type.as_deref().unwrap_or("unknown")
    );

    match classify_status(status) {
        StatusClass::Success => Ok(ProbeResult::Accepted(Upstream {
            client,
            response,
            status,
            content_type,
        })),
        class if class.is_rejection() => {
            drop(response);
            drop(client);
            Ok(ProbeResult::Rejected(status))
        }
        _ => Err(UpstreamFault::Transport(format!("unexpected upstream status {}", status))),
    }
}
