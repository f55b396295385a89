//! Web server shared state.

use std::sync::Arc;
use std::time::Instant;

use crate::playlist::{ChannelStore, M3uDownloader, PlaylistRefresher};
use crate::scheduler::RefreshScheduler;
use crate::settings::SettingsStore;
use crate::tuner::{FallbackConfig, FallbackGenerator, StreamArbiter, StreamDispatcher, UpstreamTimeouts};

/// Everything the HTTP handlers need.
pub struct AppContext {
    pub settings: Arc<SettingsStore>,
    pub channels: Arc<ChannelStore>,
    pub arbiter: Arc<StreamArbiter>,
    pub fallback: Arc<FallbackGenerator>,
    pub dispatcher: StreamDispatcher,
    pub refresher: Arc<PlaylistRefresher>,
    pub scheduler: Arc<RefreshScheduler>,
    /// Base URL advertised to media servers, without a trailing slash.
    pub base_url: String,
    pub started_at: Instant,
}

impl AppContext {
    pub fn new(
        settings: Arc<SettingsStore>,
        base_url: &str,
        timeouts: UpstreamTimeouts,
        fallback: FallbackConfig,
    ) -> Self {
        let channels = Arc::new(ChannelStore::new());
        let arbiter = Arc::new(StreamArbiter::new(timeouts));
        let fallback = Arc::new(FallbackGenerator::new(fallback));
        let dispatcher = StreamDispatcher::new(
            Arc::clone(&channels),
            Arc::clone(&settings),
            Arc::clone(&arbiter),
            Arc::clone(&fallback),
        );
        let refresher = Arc::new(PlaylistRefresher::new(
            Arc::clone(&settings),
            Arc::clone(&channels),
            M3uDownloader::default(),
        ));
        let scheduler = Arc::new(RefreshScheduler::new(Arc::clone(&refresher), Arc::clone(&settings)));

        Self {
            settings,
            channels,
            arbiter,
            fallback,
            dispatcher,
            refresher,
            scheduler,
            base_url: base_url.trim_end_matches('/').to_string(),
            started_at: Instant::now(),
        }
    }
}
