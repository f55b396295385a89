//! In-process upstream used by the tuner tests.
//!
//! Serves the response shapes an IPTV provider produces (endless stream,
//! finite file, stalled body, rejections, redirects) and counts how many
//! response bodies are open at once.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::tuner::ts_packet::{SYNC_BYTE, TS_PACKET_SIZE};

/// Size of the fixed body served by `/finite`.
pub const FINITE_BODY_LEN: usize = 200_000;

/// Packets printed by the encoder from [`write_fake_encoder`].
pub const FAKE_ENCODER_PACKETS: usize = 1000;

/// File the fake encoder writes its arguments to, one per line.
pub const FAKE_ENCODER_ARGS: &str = "encoder-args";

/// Write an `ffmpeg` stand-in into `dir`. It answers `-version`, records its
/// arguments in `dir/encoder-args` and prints [`FAKE_ENCODER_PACKETS`] TS packets.
#[cfg(unix)]
pub fn write_fake_encoder(dir: &std::path::Path) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = format!(
        r#"#!/bin/sh
if [ "$1" = "-version" ]; then
    echo "fake encoder 1.0"
    exit 0
fi
printf '%s\n' "$@" > '{args}'
packet="G$(printf '%0{pad}d' 0)"
i=0
while [ $i -lt {count} ]; do
    printf '%s' "$packet"
    i=$((i + 1))
done
"#,
        args = dir.join(FAKE_ENCODER_ARGS).display(),
        pad = TS_PACKET_SIZE - 1,
        count = FAKE_ENCODER_PACKETS,
    );
    let path = dir.join("fake-encoder");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[derive(Clone, Default)]
struct UpstreamState {
    open_bodies: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
    hits: Arc<Mutex<Vec<(String, Instant)>>>,
    user_agent: Arc<Mutex<Option<String>>>,
}

impl UpstreamState {
    fn record(&self, uri: &Uri, headers: &HeaderMap) {
        self.hits.lock().unwrap().push((uri.path().to_string(), Instant::now()));
        let agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *self.user_agent.lock().unwrap() = agent;
    }

    fn tracked_body<S>(&self, body: S) -> Body
    where
        S: Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
    {
        let open = self.open_bodies.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(open, Ordering::SeqCst);
        let guard = BodyGuard(Arc::clone(&self.open_bodies));
        Body::from_stream(body.map(move |item| {
            let _ = &guard;
            item
        }))
    }
}

struct BodyGuard(Arc<AtomicUsize>);

impl Drop for BodyGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn ts_chunk(packets: usize) -> Bytes {
    let mut data = vec![0u8; packets * TS_PACKET_SIZE];
    for packet in data.chunks_mut(TS_PACKET_SIZE) {
        packet[0] = SYNC_BYTE;
    }
    Bytes::from(data)
}

fn ts_response(body: Body) -> Response {
    ([(header::CONTENT_TYPE, "video/mp2t")], body).into_response()
}

async fn live(State(state): State<UpstreamState>, uri: Uri, headers: HeaderMap) -> Response {
    state.record(&uri, &headers);
    let body = stream::unfold((), |_| async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Some((Ok::<_, Infallible>(ts_chunk(8)), ()))
    });
    ts_response(state.tracked_body(body))
}

async fn finite(State(state): State<UpstreamState>, uri: Uri, headers: HeaderMap) -> Response {
    state.record(&uri, &headers);
    let body = stream::iter(vec![Ok::<_, Infallible>(Bytes::from(vec![SYNC_BYTE; FINITE_BODY_LEN]))]);
    ts_response(state.tracked_body(body))
}

async fn hang(State(state): State<UpstreamState>, uri: Uri, headers: HeaderMap) -> Response {
    state.record(&uri, &headers);
    ts_response(state.tracked_body(stream::pending::<Result<Bytes, Infallible>>()))
}

async fn stall(State(state): State<UpstreamState>, uri: Uri, headers: HeaderMap) -> Response {
    state.record(&uri, &headers);
    let body = stream::iter(vec![Ok::<_, Infallible>(ts_chunk(4))])
        .chain(stream::pending::<Result<Bytes, Infallible>>());
    ts_response(state.tracked_body(body))
}

async fn status(
    State(state): State<UpstreamState>,
    Path(code): Path<u16>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    state.record(&uri, &headers);
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, "rejected").into_response()
}

async fn slow_headers(State(state): State<UpstreamState>, uri: Uri, headers: HeaderMap) -> Response {
    state.record(&uri, &headers);
    tokio::time::sleep(Duration::from_secs(10)).await;
    ts_response(Body::from(ts_chunk(1)))
}

async fn redirect(State(state): State<UpstreamState>, uri: Uri, headers: HeaderMap) -> Response {
    state.record(&uri, &headers);
    (StatusCode::FOUND, [(header::LOCATION, "/finite")]).into_response()
}

async fn redirect_loop(State(state): State<UpstreamState>, uri: Uri, headers: HeaderMap) -> Response {
    state.record(&uri, &headers);
    (StatusCode::FOUND, [(header::LOCATION, "/loop")]).into_response()
}

async fn playlist(State(state): State<UpstreamState>, uri: Uri, headers: HeaderMap) -> Response {
    state.record(&uri, &headers);
    SAMPLE_PLAYLIST.into_response()
}

/// Playlist served by `/playlist.m3u`.
pub const SAMPLE_PLAYLIST: &str = r#"#EXTM3U
#EXTINF:-1 tvg-id="cn.science" tvg-name="Science Channel" tvg-logo="http://logo.png" group-title="Documentary",Science Channel
http://stream.url/science
#EXTINF:-1 tvg-name="Nat Geo" group-title="Documentary",Nat Geo Wild
http://stream.url/natgeo
#EXTINF:-1,Movie Channel
http://stream.url/movie/1.ts
"#;

/// A running upstream bound to an ephemeral local port.
pub struct TestUpstream {
    addr: SocketAddr,
    state: UpstreamState,
    server: JoinHandle<()>,
}

impl TestUpstream {
    pub async fn start() -> Self {
        let state = UpstreamState::default();
        let app = Router::new()
            .route("/live/:name", get(live))
            .route("/finite", get(finite))
            .route("/hang", get(hang))
            .route("/stall", get(stall))
            .route("/status/:code", get(status))
            .route("/slow-headers", get(slow_headers))
            .route("/redirect", get(redirect))
            .route("/loop", get(redirect_loop))
            .route("/playlist.m3u", get(playlist))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state, server }
    }

    /// An address nothing is listening on.
    pub async fn unused_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn open_bodies(&self) -> usize {
        self.state.open_bodies.load(Ordering::SeqCst)
    }

    pub fn max_open_bodies(&self) -> usize {
        self.state.max_open.load(Ordering::SeqCst)
    }

    pub fn hits(&self) -> Vec<(String, Instant)> {
        self.state.hits.lock().unwrap().clone()
    }

    pub fn hit_time(&self, path: &str) -> Option<Instant> {
        self.hits()
            .into_iter()
            .find(|(p, _)| p == path)
            .map(|(_, at)| at)
    }

    pub fn last_user_agent(&self) -> Option<String> {
        self.state.user_agent.lock().unwrap().clone()
    }

    /// Wait until at most `n` bodies are open.
    pub async fn wait_open_bodies_at_most(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.open_bodies() <= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.open_bodies() <= n
    }
}

impl Drop for TestUpstream {
    fn drop(&mut self) {
        self.server.abort();
    }
}
