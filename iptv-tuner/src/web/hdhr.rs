//! HDHomeRun-compatible endpoints polled by media servers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use hdhr_protocol::{DiscoverResponse, LineupEntry, LineupStatus, STREAM_CONTENT_TYPE};
use log::{error, info};
use serde::Deserialize;
use serde_json::json;

use crate::epg::generate_xmltv;
use crate::tuner::DispatchError;
use crate::web::state::AppContext;

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let code = self.code();
        let status = StatusCode::from_u16(code.into()).unwrap_or(StatusCode::BAD_GATEWAY);
        (status, Json(json!({ "detail": code.detail() }))).into_response()
    }
}

/// Device discovery document.
pub async fn discover(State(ctx): State<Arc<AppContext>>) -> Json<DiscoverResponse> {
    let identity = ctx.settings.snapshot().identity();
    Json(DiscoverResponse::new(&identity, &ctx.base_url))
}

pub async fn lineup_status() -> Json<LineupStatus> {
    Json(LineupStatus::default())
}

/// Scan trigger. The lineup comes from the playlist, so there is nothing to scan.
pub async fn lineup_post(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    info!("lineup.post called with {:?}", params);
    Json(json!({}))
}

pub async fn lineup(State(ctx): State<Arc<AppContext>>) -> Json<Vec<LineupEntry>> {
    let lineup = ctx.channels.snapshot();
    Json(
        lineup
            .channels
            .iter()
            .map(|ch| ch.lineup_entry(&ctx.base_url))
            .collect(),
    )
}

#[derive(Debug, Deserialize)]
pub struct EpgQuery {
    /// Cache-busting version, echoed in the ETag.
    v: Option<String>,
}

/// XMLTV guide for the published lineup.
pub async fn epg(State(ctx): State<Arc<AppContext>>, Query(query): Query<EpgQuery>) -> Response {
    let lineup = ctx.channels.snapshot();
    let now = Utc::now();

    let xml = match generate_xmltv(&lineup.channels, now) {
        Ok(xml) => xml,
        Err(e) => {
            error!("Failed to generate guide: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": e.to_string() })),
            )
                .into_response();
        }
    };

    let etag = format!(
        "\"{}-{}\"",
        lineup.channels.len(),
        query.v.as_deref().unwrap_or("1")
    );
    let last_modified = now.format("%a, %d %b %Y %H:%M:%S GMT").to_string();

    (
        [
            (header::CONTENT_TYPE, "application/xml".to_string()),
            (header::CACHE_CONTROL, "no-cache, must-revalidate".to_string()),
            (header::LAST_MODIFIED, last_modified),
            (header::ETAG, etag),
            (header::CONTENT_DISPOSITION, "inline; filename=epg.xml".to_string()),
        ],
        xml,
    )
        .into_response()
}

/// MPEG-TS for one channel, live or fallback.
pub async fn stream(
    State(ctx): State<Arc<AppContext>>,
    Path(channel_id): Path<String>,
) -> Result<Response, DispatchError> {
    let stream = ctx.dispatcher.dispatch(&channel_id).await?;
    if stream.is_fallback() {
        info!("Serving placeholder for {}", channel_id);
    }
    Ok((
        [
            (header::CONTENT_TYPE, STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

pub async fn health(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "channels_loaded": ctx.channels.len(),
        "m3u_url_configured": !ctx.settings.snapshot().m3u_url.is_empty(),
    }))
}
