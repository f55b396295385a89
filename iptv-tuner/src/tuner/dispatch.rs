//! Channel lookup and live/fallback selection for stream requests.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use hdhr_protocol::StreamErrorCode;
use log::{error, info, warn};
use thiserror::Error;

use super::arbiter::{StreamArbiter, StreamOutcome, StreamRequest};
use super::fallback::{FallbackGenerator, FallbackStream};
use super::prober::UpstreamFault;
use super::relay::LiveStream;
use crate::playlist::ChannelStore;
use crate::settings::SettingsStore;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Stream request failures visible to the media server.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Channel not found: {0}")]
    NotFound(String),

    #[error("Upstream answered {0}")]
    Unavailable(u16),

    #[error("{0}")]
    Fault(UpstreamFault),
}

impl DispatchError {
    pub fn code(&self) -> StreamErrorCode {
        match self {
            DispatchError::NotFound(_) => StreamErrorCode::NotFound,
            DispatchError::Unavailable(_) => StreamErrorCode::ServiceUnavailable,
            DispatchError::Fault(fault) if fault.is_timeout() => StreamErrorCode::GatewayTimeout,
            DispatchError::Fault(_) => StreamErrorCode::BadGateway,
        }
    }
}

/// Body of a successful stream request.
pub enum TunerStream {
    Live(LiveStream),
    Fallback(FallbackStream),
}

impl TunerStream {
    pub fn is_fallback(&self) -> bool {
        matches!(self, TunerStream::Fallback(_))
    }
}

impl Stream for TunerStream {
    type Item = Result<Bytes, BoxError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut() {
            TunerStream::Live(stream) => Pin::new(stream)
                .poll_next(cx)
                .map(|item| item.map(|r| r.map_err(BoxError::from))),
            TunerStream::Fallback(stream) => Pin::new(stream)
                .poll_next(cx)
                .map(|item| item.map(|r| r.map_err(BoxError::from))),
        }
    }
}

/// Turns a channel id into a stream.
pub struct StreamDispatcher {
    channels: Arc<ChannelStore>,
    settings: Arc<SettingsStore>,
    arbiter: Arc<StreamArbiter>,
    fallback: Arc<FallbackGenerator>,
}

impl StreamDispatcher {
    pub fn new(
        channels: Arc<ChannelStore>,
        settings: Arc<SettingsStore>,
        arbiter: Arc<StreamArbiter>,
        fallback: Arc<FallbackGenerator>,
    ) -> Self {
        Self {
            channels,
            settings,
            arbiter,
            fallback,
        }
    }

    pub async fn dispatch(&self, channel_id: &str) -> Result<TunerStream, DispatchError> {
        let channel = self.channels.find(channel_id).ok_or_else(|| {
            error!("Channel not found: {}", channel_id);
            DispatchError::NotFound(channel_id.to_string())
        })?;
        info!("Stream request for: {} ({})", channel.name, channel.id);

        // Tuning values are read per request so edits apply to the next tune.
        let settings = self.settings.snapshot();
        let request = StreamRequest {
            url: channel.url.clone(),
            user_agent: settings.user_agent.clone(),
            kill_delay: settings.kill_delay(),
            read_timeout: settings.read_timeout(),
        };

        let err = match self.arbiter.request_stream(request).await {
            StreamOutcome::Live(stream) => {
                info!("[Session {}] Streaming {}", stream.session_id(), channel.name);
                return Ok(TunerStream::Live(stream));
            }
            StreamOutcome::Unavailable(status) => DispatchError::Unavailable(status),
            StreamOutcome::Fault(fault) => DispatchError::Fault(fault),
        };

        if !self.fallback.is_available().await {
            warn!("No fallback available for {}: {}", channel.name, err);
            return Err(err);
        }
        match self.fallback.generate(None).await {
            Ok(stream) => {
                info!(
                    "Serving fallback for: {} ({}, encoder pid {})",
                    channel.name,
                    err,
                    stream.pid().unwrap_or_default()
                );
                Ok(TunerStream::Fallback(stream))
            }
            Err(e) => {
                error!("Failed to start fallback stream for {}: {}", channel.name, e);
                Err(err)
            }
        }
    }
}
