//! Management API endpoints for the dashboard.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::{error, info, warn};
use serde_json::json;

use crate::playlist::PlaylistError;
use crate::settings::{SettingsError, SettingsPatch};
use crate::web::state::AppContext;

fn error_response(status: StatusCode, detail: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "success": false, "detail": detail.to_string() }))).into_response()
}

// ============================================================================
// Settings
// ============================================================================

pub async fn get_settings(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    Json(ctx.settings.snapshot().as_ref().clone())
}

/// Apply a partial settings update.
///
/// A changed playlist URL or category selection reloads the lineup right away;
/// a changed interval moves the next scheduled refresh.
pub async fn update_settings(
    State(ctx): State<Arc<AppContext>>,
    Json(patch): Json<SettingsPatch>,
) -> Response {
    let change = match ctx.settings.update(&patch).await {
        Ok(change) => change,
        Err(SettingsError::Invalid(detail)) => {
            warn!("Rejected settings update: {}", detail);
            return error_response(StatusCode::BAD_REQUEST, detail);
        }
        Err(e) => {
            error!("Failed to save settings: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e);
        }
    };

    let mut refresh = None;
    if change.lineup_changed() {
        info!("Playlist selection changed, reloading channels");
        match ctx.refresher.refresh().await {
            Ok(summary) => refresh = Some(summary),
            Err(PlaylistError::NotConfigured) => {}
            Err(e) => error!("Reload after settings change failed: {}", e),
        }
    }
    if change.interval_changed() {
        ctx.scheduler.reschedule();
    }

    Json(json!({
        "success": true,
        "settings": change.after.as_ref(),
        "refresh": refresh,
    }))
    .into_response()
}

// ============================================================================
// Categories
// ============================================================================

pub async fn get_categories(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    Json(ctx.channels.snapshot().category_names())
}

pub async fn get_category_details(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    Json(ctx.channels.snapshot().category_details())
}

// ============================================================================
// Refresh / status
// ============================================================================

/// Reload the playlist now.
pub async fn refresh(State(ctx): State<Arc<AppContext>>) -> Response {
    match ctx.refresher.refresh().await {
        Ok(summary) => Json(json!({
            "success": true,
            "message": format!("Loaded {} channels", summary.published),
            "summary": summary,
        }))
        .into_response(),
        Err(PlaylistError::NotConfigured) => Json(json!({
            "success": true,
            "message": "No playlist URL configured",
        }))
        .into_response(),
        Err(e) => {
            error!("Manual refresh failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

pub async fn get_status(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let lineup = ctx.channels.snapshot();
    Json(json!({
        "session": ctx.arbiter.status(),
        "channels_loaded": lineup.channels.len(),
        "refreshed_at": lineup.refreshed_at.map(|t| t.to_rfc3339()),
        "fallback_available": ctx.fallback.is_available().await,
        "uptime_seconds": ctx.started_at.elapsed().as_secs(),
    }))
}
