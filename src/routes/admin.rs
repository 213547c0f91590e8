//! Admin endpoints for cache management

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;

/// Query params for admin operations
#[derive(Debug, Deserialize)]
pub struct AdminQuery {
    /// Admin key for authorization (simple protection)
    pub key: Option<String>,
}

/// Outcome of one source refresh
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedSource {
    pub source_key: String,
    pub channels: usize,
    pub categories: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    pub sources: Vec<RefreshedSource>,
}

/// Admin endpoints are disabled unless ADMIN_KEY is configured
fn validate_admin_key(state: &AppState, provided_key: Option<&str>) -> bool {
    match (state.config.admin_key.as_deref(), provided_key) {
        (Some(admin_key), Some(key)) => key == admin_key,
        _ => false,
    }
}

/// POST /api/admin/refresh - refetch every configured source now
pub async fn refresh_sources(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    if !validate_admin_key(&state, query.key.as_deref()) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Invalid or missing admin key" })),
        ));
    }

    // Distinct (source_key, url) pairs under the configured scope
    let mut sources: Vec<(String, &str)> = Vec::new();
    for (username, user) in state.config.users.iter() {
        let key = state
            .config
            .cache_scope
            .source_key(username, &user.playlist_url);
        if !sources.iter().any(|(existing, _)| *existing == key) {
            sources.push((key, user.playlist_url.as_str()));
        }
    }

    let state_ref: &AppState = &state;
    let refreshes = sources.iter().map(|(key, url)| async move {
        state_ref
            .cache
            .force_refresh(key, move || state_ref.fetcher.fetch_playlist(url))
            .await
    });
    let entries = futures::future::join_all(refreshes).await;

    let sources: Vec<RefreshedSource> = entries
        .iter()
        .map(|entry| RefreshedSource {
            source_key: entry.source_key.clone(),
            channels: entry.playlist.channels.len(),
            categories: entry.playlist.categories.len(),
            error: entry.last_error.clone(),
        })
        .collect();

    tracing::info!(
        sources = sources.len(),
        failed = sources.iter().filter(|s| s.error.is_some()).count(),
        "admin refresh completed"
    );

    Ok(Json(RefreshResponse {
        success: sources.iter().all(|s| s.error.is_none()),
        sources,
    }))
}
