//! Placeholder stream generated by an external encoder.
//!
//! When no live upstream can be obtained the client still gets a valid
//! MPEG-TS stream (black frame with a message), so media servers show a
//! picture instead of a tuner error. The encoder runs as a child process and
//! is stopped as soon as the client goes away.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, OnceCell};

use super::ts_packet::is_aligned_ts;

/// Read size from the encoder's stdout.
pub const FALLBACK_CHUNK_SIZE: usize = 8 * 1024;

/// Default length of a placeholder stream.
pub const DEFAULT_FALLBACK_DURATION: Duration = Duration::from_secs(300);

/// Text drawn on the placeholder frame.
pub const FALLBACK_MESSAGE: &str = "Stream Not Available";

const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(5);
const TERMINATE_GRACE: Duration = Duration::from_secs(2);
const FALLBACK_QUEUE_DEPTH: usize = 32;
const CHUNK_LOG_INTERVAL: u64 = 100;

/// Fallback generator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackConfig {
    /// Encoder executable (`ffmpeg` compatible command line).
    pub encoder: PathBuf,
    pub duration: Duration,
    pub enabled: bool,
    pub message: String,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            encoder: PathBuf::from("ffmpeg"),
            duration: DEFAULT_FALLBACK_DURATION,
            enabled: true,
            message: FALLBACK_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("Fallback generation is disabled")]
    Disabled,

    #[error("Encoder not available: {0}")]
    Unavailable(String),

    #[error("Failed to start encoder: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Encoder has no stdout")]
    NoOutput,
}

/// Starts placeholder streams on demand.
pub struct FallbackGenerator {
    config: FallbackConfig,
    available: OnceCell<bool>,
}

impl FallbackGenerator {
    pub fn new(config: FallbackConfig) -> Self {
        Self {
            config,
            available: OnceCell::new(),
        }
    }

    /// Whether a placeholder can be produced. The encoder check runs once.
    pub async fn is_available(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        *self
            .available
            .get_or_init(|| check_encoder(&self.config.encoder))
            .await
    }

    /// Encoder arguments for a placeholder of `duration`.
    pub fn encoder_args(&self, duration: Duration) -> Vec<String> {
        let seconds = duration.as_secs().max(1);
        let text = self.config.message.replace(['\'', '\\', ':'], " ");
        let source = format!("color=c=black:s=1280x720:d={}:r=25", seconds);
        let overlay = format!(
            "drawtext=text='{}':fontsize=48:fontcolor=white:x=(w-tw)/2:y=(h-th)/2",
            text
        );
        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "lavfi",
            "-i",
            &source,
            "-vf",
            &overlay,
            "-c:v",
            "libx264",
            "-preset",
            "ultrafast",
            "-tune",
            "zerolatency",
            "-b:v",
            "1M",
            "-g",
            "50",
            "-f",
            "mpegts",
            "-mpegts_flags",
            "resend_headers",
            "-muxrate",
            "2M",
            "-",
        ]
        .iter()
        .map(|arg| arg.to_string())
        .collect()
    }

    /// Start a placeholder stream. `None` uses the configured duration.
    pub async fn generate(&self, duration: Option<Duration>) -> Result<FallbackStream, FallbackError> {
        if !self.config.enabled {
            return Err(FallbackError::Disabled);
        }
        if !self.is_available().await {
            return Err(FallbackError::Unavailable(self.config.encoder.display().to_string()));
        }

        let duration = duration.unwrap_or(self.config.duration);
        info!("Starting fallback stream (duration={}s)", duration.as_secs());

        let mut command = Command::new(&self.config.encoder);
        command.args(self.encoder_args(duration));
        FallbackStream::spawn(command)
    }
}

async fn check_encoder(encoder: &Path) -> bool {
    let mut command = Command::new(encoder);
    command
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    match tokio::time::timeout(AVAILABILITY_TIMEOUT, command.status()).await {
        Ok(Ok(status)) if status.success() => {
            info!("Fallback encoder available: {}", encoder.display());
            true
        }
        Ok(Ok(status)) => {
            warn!("Fallback encoder {} exited with {}", encoder.display(), status);
            false
        }
        Ok(Err(e)) => {
            warn!("Fallback encoder {} not found: {}", encoder.display(), e);
            false
        }
        Err(_) => {
            warn!("Fallback encoder {} did not answer within {:?}", encoder.display(), AVAILABILITY_TIMEOUT);
            false
        }
    }
}

/// Encoder output as a stream of chunks of at most [`FALLBACK_CHUNK_SIZE`].
///
/// Dropping the stream stops the encoder.
pub struct FallbackStream {
    rx: mpsc::Receiver<std::io::Result<Bytes>>,
    pid: Option<u32>,
}

impl FallbackStream {
    /// Spawn `command` and stream its stdout.
    pub fn spawn(mut command: Command) -> Result<Self, FallbackError> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let pid = child.id();
        let stdout = child.stdout.take().ok_or(FallbackError::NoOutput)?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(pid, stderr));
        }

        let (tx, rx) = mpsc::channel(FALLBACK_QUEUE_DEPTH);
        tokio::spawn(pump(child, stdout, tx));
        Ok(Self { rx, pid })
    }

    /// Process id of the encoder.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

impl Stream for FallbackStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

async fn pump(mut child: Child, mut stdout: ChildStdout, tx: mpsc::Sender<std::io::Result<Bytes>>) {
    let pid = child.id().unwrap_or_default();
    let mut buf = vec![0u8; FALLBACK_CHUNK_SIZE];
    let mut chunks: u64 = 0;

    loop {
        let read = tokio::select! {
            biased;
            _ = tx.closed() => {
                info!("[Fallback {}] Client disconnected", pid);
                break;
            }
            read = stdout.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                info!("[Fallback {}] Encoder finished ({} chunks)", pid, chunks);
                break;
            }
            Ok(n) => {
                if chunks == 0 && !is_aligned_ts(&buf[..n]) {
                    warn!("[Fallback {}] Encoder output does not start with a TS packet", pid);
                }
                chunks += 1;
                if chunks % CHUNK_LOG_INTERVAL == 0 {
                    debug!("[Fallback {}] {} chunks sent", pid, chunks);
                }
                if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
                    info!("[Fallback {}] Client disconnected", pid);
                    break;
                }
            }
            Err(e) => {
                error!("[Fallback {}] Failed to read encoder output: {}", pid, e);
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }

    drop(stdout);
    stop_child(&mut child, pid).await;
}

/// SIGTERM, then SIGKILL after the grace period.
async fn stop_child(child: &mut Child, pid: u32) {
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!("[Fallback {}] Encoder exited with {}", pid, status);
            return;
        }
        Ok(None) => {}
        Err(e) => warn!("[Fallback {}] Failed to poll encoder: {}", pid, e),
    }

    if send_terminate(pid) {
        match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("[Fallback {}] Encoder stopped with {}", pid, status);
                return;
            }
            Ok(Err(e)) => warn!("[Fallback {}] Failed to wait for encoder: {}", pid, e),
            Err(_) => warn!("[Fallback {}] Encoder ignored SIGTERM, killing", pid),
        }
    }

    if let Err(e) = child.kill().await {
        warn!("[Fallback {}] Failed to kill encoder: {}", pid, e);
    }
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => kill(Pid::from_raw(raw), Signal::SIGTERM).is_ok(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn send_terminate(_pid: u32) -> bool {
    false
}

async fn drain_stderr(pid: Option<u32>, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        warn!("[Fallback {}] {}", pid.unwrap_or_default(), line);
    }
}
