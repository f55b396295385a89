//! Single-tuner stream management.
//!
//! This module provides:
//! - [`prober`]: Upstream connection setup and status classification
//! - [`StreamArbiter`]: The one upstream session, with kill-switch replacement
//! - [`relay`]: Chunked copy from upstream to the client
//! - [`FallbackGenerator`]: Placeholder stream when no upstream is usable
//! - [`StreamDispatcher`]: Channel lookup and live/fallback selection

pub mod arbiter;
pub mod dispatch;
pub mod fallback;
pub mod prober;
pub mod relay;
pub mod ts_packet;

#[cfg(test)]
pub(crate) mod testing;

pub use arbiter::StreamArbiter;
pub use dispatch::{DispatchError, StreamDispatcher};
pub use fallback::{FallbackConfig, FallbackGenerator};
pub use prober::UpstreamTimeouts;
