//! Chunked copy from an accepted upstream to the client-facing body.
//!
//! The relay runs as its own task and owns the upstream response together
//! with its client. Chunks are handed to the HTTP response through a bounded
//! channel, so a slow client applies backpressure to the upstream read and a
//! dropped client is noticed at the next chunk boundary.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::prober::Upstream;

/// Largest chunk handed to the client.
pub const RELAY_CHUNK_SIZE: usize = 64 * 1024;

/// Chunks buffered between the relay task and the client response.
const RELAY_QUEUE_DEPTH: usize = 16;

/// Chunk counter interval for progress logging.
const CHUNK_LOG_INTERVAL: u64 = 100;

/// Fault that ends a relay after bytes may already have been sent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("No data from upstream for {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Upstream transport error: {0}")]
    Transport(String),
}

/// Why a relay stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEnd {
    /// Upstream finished the body.
    Eof,
    /// The client went away.
    ClientGone,
    /// A newer request took over the tuner.
    Preempted,
    /// Upstream failed mid-stream.
    Fault(RelayError),
}

/// Byte and chunk counters of one relay, readable while it runs.
#[derive(Debug, Default)]
pub struct RelayStats {
    bytes: AtomicU64,
    chunks: AtomicU64,
}

impl RelayStats {
    fn record(&self, len: usize) -> u64 {
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
        self.chunks.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn chunks(&self) -> u64 {
        self.chunks.load(Ordering::Relaxed)
    }
}

/// Relay of one session, ready to be spawned.
pub struct Relay {
    session_id: u64,
    upstream: Upstream,
    read_timeout: Duration,
    cancel: CancellationToken,
    stats: Arc<RelayStats>,
}

impl Relay {
    pub fn new(
        session_id: u64,
        upstream: Upstream,
        read_timeout: Duration,
        cancel: CancellationToken,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            session_id,
            upstream,
            read_timeout,
            cancel,
            stats,
        }
    }

    /// Start copying. The handle resolves once the upstream is released.
    pub fn spawn(self) -> (JoinHandle<RelayEnd>, LiveStream) {
        let (tx, rx) = mpsc::channel(RELAY_QUEUE_DEPTH);
        let session_id = self.session_id;
        let handle = tokio::spawn(self.run(tx));
        (handle, LiveStream { session_id, rx })
    }

    async fn run(self, tx: mpsc::Sender<Result<Bytes, RelayError>>) -> RelayEnd {
        let Relay {
            session_id,
            upstream,
            read_timeout,
            cancel,
            stats,
        } = self;
        let Upstream {
            client,
            mut response,
            ..
        } = upstream;

        debug!("[Session {}] Relay started", session_id);

        let end = 'relay: loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'relay RelayEnd::Preempted,
                _ = tx.closed() => break 'relay RelayEnd::ClientGone,
                next = tokio::time::timeout(read_timeout, response.chunk()) => next,
            };

            let mut chunk = match next {
                Ok(Ok(Some(chunk))) => chunk,
                Ok(Ok(None)) => break 'relay RelayEnd::Eof,
                Ok(Err(e)) => break 'relay RelayEnd::Fault(RelayError::Transport(e.to_string())),
                Err(_) => break 'relay RelayEnd::Fault(RelayError::Timeout(read_timeout)),
            };

            while !chunk.is_empty() {
                let piece = chunk.split_to(chunk.len().min(RELAY_CHUNK_SIZE));
                let len = piece.len();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'relay RelayEnd::Preempted,
                    sent = tx.send(Ok(piece)) => {
                        if sent.is_err() {
                            break 'relay RelayEnd::ClientGone;
                        }
                    }
                }
                let count = stats.record(len);
                if count % CHUNK_LOG_INTERVAL == 0 {
                    debug!(
                        "[Session {}] Relayed {} chunks, {} bytes",
                        session_id,
                        count,
                        stats.bytes()
                    );
                }
            }
        };

        // Release the upstream before the client observes the end of the body.
        drop(response);
        drop(client);

        match &end {
            RelayEnd::Eof => info!("[Session {}] Upstream finished ({} bytes)", session_id, stats.bytes()),
            RelayEnd::ClientGone => info!("[Session {}] Client disconnected", session_id),
            RelayEnd::Preempted => info!("[Session {}] Preempted by a new request", session_id),
            RelayEnd::Fault(err) => {
                error!("[Session {}] Relay aborted: {}", session_id, err);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    sent = tx.send(Err(err.clone())) => {
                        if sent.is_err() {
                            warn!("[Session {}] Client gone before the fault was reported", session_id);
                        }
                    }
                }
            }
        }

        end
    }
}

/// Client side of a live relay.
///
/// Yields upstream chunks of at most [`RELAY_CHUNK_SIZE`] bytes. A mid-stream
/// fault is yielded as an error so the response is aborted rather than ended
/// cleanly. Dropping the stream stops the relay.
pub struct LiveStream {
    session_id: u64,
    rx: mpsc::Receiver<Result<Bytes, RelayError>>,
}

impl LiveStream {
    pub fn session_id(&self) -> u64 {
        self.session_id
    }
}

impl Stream for LiveStream {
    type Item = Result<Bytes, RelayError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuner::prober::{probe, ProbeResult, UpstreamTimeouts};
    use crate::tuner::testing::{TestUpstream, FINITE_BODY_LEN};
    use futures::StreamExt;

    async fn accepted(upstream: &TestUpstream, path: &str) -> Upstream {
        match probe(&upstream.url(path), "test", &UpstreamTimeouts::default())
            .await
            .unwrap()
        {
            ProbeResult::Accepted(accepted) => accepted,
            ProbeResult::Rejected(status) => panic!("rejected with {}", status),
        }
    }

    fn start(upstream: Upstream, read_timeout: Duration) -> (JoinHandle<RelayEnd>, LiveStream, CancellationToken, Arc<RelayStats>) {
        let cancel = CancellationToken::new();
        let stats = Arc::new(RelayStats::default());
        let (handle, stream) = Relay::new(1, upstream, read_timeout, cancel.clone(), Arc::clone(&stats)).spawn();
        (handle, stream, cancel, stats)
    }

    #[tokio::test]
    async fn test_relay_until_eof() {
        let server = TestUpstream::start().await;
        let (handle, mut stream, _cancel, stats) = start(accepted(&server, "/finite").await, Duration::from_secs(5));

        let mut total = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            assert!(chunk.len() <= RELAY_CHUNK_SIZE);
            total += chunk.len();
        }

        assert_eq!(total, FINITE_BODY_LEN);
        assert_eq!(handle.await.unwrap(), RelayEnd::Eof);
        assert_eq!(stats.bytes(), FINITE_BODY_LEN as u64);
        assert!(stats.chunks() >= 4);
    }

    #[tokio::test]
    async fn test_client_drop_releases_upstream() {
        let server = TestUpstream::start().await;
        let (handle, mut stream, _cancel, _stats) = start(accepted(&server, "/live/a").await, Duration::from_secs(5));

        assert!(stream.next().await.unwrap().is_ok());
        drop(stream);

        let end = tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert_eq!(end, RelayEnd::ClientGone);
        assert!(server.wait_open_bodies_at_most(0, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_read_timeout_is_a_fault() {
        let server = TestUpstream::start().await;
        let (handle, mut stream, _cancel, _stats) = start(accepted(&server, "/stall").await, Duration::from_millis(200));

        assert!(stream.next().await.unwrap().is_ok());
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err, RelayError::Timeout(Duration::from_millis(200)));
        assert!(stream.next().await.is_none());
        assert!(matches!(handle.await.unwrap(), RelayEnd::Fault(RelayError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_cancel_preempts_relay() {
        let server = TestUpstream::start().await;
        let (handle, mut stream, cancel, _stats) = start(accepted(&server, "/hang").await, Duration::from_secs(30));

        cancel.cancel();
        let end = tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(end, RelayEnd::Preempted);
        assert!(stream.next().await.is_none());
    }
}
