//! HTTP surface: HDHomeRun emulation, management API and dashboard.

pub mod api;
pub mod dashboard;
pub mod hdhr;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::AppContext;

/// Build the application router.
pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        // HDHomeRun emulation
        .route("/discover.json", get(hdhr::discover))
        .route("/lineup_status.json", get(hdhr::lineup_status))
        .route("/lineup.post", post(hdhr::lineup_post))
        .route("/lineup.json", get(hdhr::lineup))
        .route("/epg.xml", get(hdhr::epg))
        .route("/stream/:channel_id", get(hdhr::stream))
        .route("/health", get(hdhr::health))
        // Management API
        .route("/api/settings", get(api::get_settings).post(api::update_settings))
        .route("/api/categories", get(api::get_categories))
        .route("/api/categories/detail", get(api::get_category_details))
        .route("/api/refresh", post(api::refresh))
        .route("/api/status", get(api::get_status))
        // Dashboard route
        .route("/", get(dashboard::index))
        .with_state(ctx)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` is cancelled.
pub async fn start_web_server(
    listen_addr: SocketAddr,
    ctx: Arc<AppContext>,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(ctx);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    log::info!("Tuner listening on http://{}", listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::m3u::parse_m3u;
    use crate::playlist::store::ChannelLineup;
    use crate::settings::{SettingsPatch, SettingsStore};
    use crate::tuner::testing::{TestUpstream, SAMPLE_PLAYLIST};
    use crate::tuner::{FallbackConfig, UpstreamTimeouts};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use futures::StreamExt;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    const BASE_URL: &str = "http://tuner.local:5004";

    struct Fixture {
        _dir: tempfile::TempDir,
        ctx: Arc<AppContext>,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(SettingsStore::load_or_create(dir.path().join("settings.json")).unwrap());
        settings
            .update(&SettingsPatch {
                kill_switch_delay_ms: Some(0),
                ..Default::default()
            })
            .await
            .unwrap();
        let fallback = FallbackConfig {
            enabled: false,
            ..FallbackConfig::default()
        };
        let ctx = Arc::new(AppContext::new(
            settings,
            &format!("{}/", BASE_URL),
            UpstreamTimeouts::default(),
            fallback,
        ));
        Fixture { _dir: dir, ctx }
    }

    fn publish(ctx: &AppContext, m3u: &str) {
        let playlist = parse_m3u(m3u);
        ctx.channels
            .publish(ChannelLineup::new(playlist.channels, playlist.categories));
    }

    async fn get(ctx: &Arc<AppContext>, uri: &str) -> Response {
        router(Arc::clone(ctx))
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn post_json(ctx: &Arc<AppContext>, uri: &str, body: &str) -> Response {
        router(Arc::clone(ctx))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_discover_document() {
        let f = fixture().await;
        let response = get(&f.ctx, "/discover.json").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["FriendlyName"], "IPTV Tuner");
        assert_eq!(body["DeviceID"], "12345678");
        assert_eq!(body["TunerCount"], 1);
        assert_eq!(body["BaseURL"], BASE_URL);
        assert_eq!(body["LineupURL"], format!("{}/lineup.json", BASE_URL));
    }

    #[tokio::test]
    async fn test_lineup_and_status_documents() {
        let f = fixture().await;
        publish(&f.ctx, SAMPLE_PLAYLIST);

        let body = json_body(get(&f.ctx, "/lineup.json").await).await;
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0]["GuideNumber"], "1");
        assert_eq!(entries[0]["GuideName"], "1 Science Channel");
        assert_eq!(entries[0]["URL"], format!("{}/stream/ch1", BASE_URL));

        let body = json_body(get(&f.ctx, "/lineup_status.json").await).await;
        assert_eq!(body["ScanInProgress"], 0);
        assert_eq!(body["SourceList"][0], "Cable");

        let response = post_json(&f.ctx, "/lineup.post?scan=start", "").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_epg_headers() {
        let f = fixture().await;
        publish(&f.ctx, SAMPLE_PLAYLIST);

        let response = get(&f.ctx, "/epg.xml?v=7").await;
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "application/xml");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache, must-revalidate");
        assert_eq!(headers[header::ETAG], "\"3-7\"");
        assert!(headers.contains_key(header::LAST_MODIFIED));

        let response = get(&f.ctx, "/epg.xml").await;
        assert_eq!(response.headers()[header::ETAG], "\"3-1\"");
        let xml = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let xml = String::from_utf8(xml.to_vec()).unwrap();
        assert_eq!(xml.matches("<programme ").count(), 72);
    }

    #[tokio::test]
    async fn test_stream_unknown_channel() {
        let f = fixture().await;
        let response = get(&f.ctx, "/stream/ch99").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["detail"], "Channel not found");
    }

    #[tokio::test]
    async fn test_stream_rejected_without_fallback() {
        let upstream = TestUpstream::start().await;
        let f = fixture().await;
        publish(&f.ctx, &format!("#EXTINF:-1,Blocked\n{}\n", upstream.url("/status/403")));

        let response = get(&f.ctx, "/stream/ch1").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["detail"], "Stream temporarily unavailable");
    }

    #[tokio::test]
    async fn test_stream_live() {
        let upstream = TestUpstream::start().await;
        let f = fixture().await;
        publish(&f.ctx, &format!("#EXTINF:-1,Live\n{}\n", upstream.url("/live/a")));

        let response = get(&f.ctx, "/stream/ch1").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mpeg");

        let mut body = response.into_body().into_data_stream();
        let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!chunk.is_empty());

        let status = json_body(get(&f.ctx, "/api/status").await).await;
        assert_eq!(status["session"]["state"], "active");
        assert_eq!(status["session"]["url"], upstream.url("/live/a"));

        drop(body);
        assert!(upstream.wait_open_bodies_at_most(0, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_settings_roundtrip_and_validation() {
        let f = fixture().await;

        let response = post_json(&f.ctx, "/api/settings", r#"{"read_timeout_seconds": 0}"#).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = post_json(&f.ctx, "/api/settings", r#"{"device_name": "Living Room"}"#).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(get(&f.ctx, "/api/settings").await).await;
        assert_eq!(body["device_name"], "Living Room");
        assert_eq!(body["read_timeout_seconds"], 30);

        let body = json_body(get(&f.ctx, "/discover.json").await).await;
        assert_eq!(body["FriendlyName"], "Living Room");
    }

    #[tokio::test]
    async fn test_playlist_change_reloads_lineup() {
        let upstream = TestUpstream::start().await;
        let f = fixture().await;

        let patch = serde_json::json!({
            "m3u_url": upstream.url("/playlist.m3u"),
            "selected_categories": ["Documentary"],
        });
        let response = post_json(&f.ctx, "/api/settings", &patch.to_string()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["refresh"]["published"], 2);

        let categories = json_body(get(&f.ctx, "/api/categories").await).await;
        assert_eq!(categories, serde_json::json!(["Documentary", "Uncategorized"]));

        let details = json_body(get(&f.ctx, "/api/categories/detail").await).await;
        assert_eq!(details[1]["type"], "movie");

        let health = json_body(get(&f.ctx, "/health").await).await;
        assert_eq!(health["channels_loaded"], 2);
        assert_eq!(health["m3u_url_configured"], true);
    }

    #[tokio::test]
    async fn test_refresh_endpoint() {
        let f = fixture().await;
        let response = post_json(&f.ctx, "/api/refresh", "").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["success"], true);

        let upstream = TestUpstream::start().await;
        f.ctx
            .settings
            .update(&SettingsPatch {
                m3u_url: Some(upstream.url("/status/500")),
                ..Default::default()
            })
            .await
            .unwrap();
        let response = post_json(&f.ctx, "/api/refresh", "").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["success"], false);
    }

    #[tokio::test]
    async fn test_status_idle_and_dashboard() {
        let f = fixture().await;
        let status = json_body(get(&f.ctx, "/api/status").await).await;
        assert_eq!(status["session"]["state"], "idle");
        assert_eq!(status["fallback_available"], false);

        let response = get(&f.ctx, "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&html).contains("<title>IPTV Tuner</title>"));
    }
}
