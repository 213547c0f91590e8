use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::services::metrics::gather_metrics;
use crate::AppState;

/// Cache entry as reported on the status page
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntryStatus {
    source_key: String,
    channels: usize,
    categories: usize,
    age_secs: u64,
    consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    name: &'static str,
    version: &'static str,
    status: &'static str,
    uptime: u64,
    stream_mode: String,
    users: usize,
    cache_ttl_secs: u64,
    cache: Vec<CacheEntryStatus>,
}

/// GET / - service status and cache contents
pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let now = state.cache.now_ms();
    let cache = state
        .cache
        .snapshot()
        .await
        .iter()
        .map(|entry| CacheEntryStatus {
            source_key: entry.source_key.clone(),
            channels: entry.playlist.channels.len(),
            categories: entry.playlist.categories.len(),
            age_secs: entry.age_secs(now),
            consecutive_failures: entry.consecutive_failures,
            last_error: entry.last_error.clone(),
        })
        .collect();

    Json(StatusResponse {
        name: "Xtream Front",
        version: env!("CARGO_PKG_VERSION"),
        status: "ok",
        uptime: state.start_time.elapsed().as_secs(),
        stream_mode: state.config.stream_mode.to_string(),
        users: state.config.users.len(),
        cache_ttl_secs: state.config.cache_ttl_secs,
        cache,
    })
}

/// GET /healthz - liveness probe
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// GET /metrics - Prometheus metrics
pub async fn metrics() -> impl IntoResponse {
    match gather_metrics() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                b"Internal Server Error".to_vec(),
            )
        }
    }
}
