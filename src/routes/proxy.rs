use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
    Json,
};

use crate::AppState;

// Re-export reqwest header module to avoid version conflicts
mod reqwest_header {
    pub use reqwest::header::{
        ACCEPT, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED, RANGE,
    };
}

/// Guess content type from URL
fn guess_content_type(url: &str) -> &'static str {
    let lower = url.to_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or_default();
    if path.ends_with(".m3u8") || path.ends_with(".m3u") {
        "application/vnd.apple.mpegurl"
    } else if path.ends_with(".mp4") {
        "video/mp4"
    } else if path.ends_with(".mkv") {
        "video/x-matroska"
    } else {
        "video/MP2T"
    }
}

/// Upstream header names copied back to the client unchanged
const PASSTHROUGH_HEADERS: [(reqwest::header::HeaderName, header::HeaderName); 4] = [
    (reqwest_header::CONTENT_LENGTH, header::CONTENT_LENGTH),
    (reqwest_header::ACCEPT_RANGES, header::ACCEPT_RANGES),
    (reqwest_header::ETAG, header::ETAG),
    (reqwest_header::LAST_MODIFIED, header::LAST_MODIFIED),
];

/// Pass-through of a channel's upstream response.
/// Forwards `Accept` and `Range`, streams the body back without buffering.
pub async fn forward_stream(
    state: &AppState,
    url: &str,
    headers: &HeaderMap,
) -> Result<Response, (StatusCode, Json<serde_json::Value>)> {
    let mut request = state.proxy_client.get(url);

    // Forward essential headers (using reqwest's header constants)
    match headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) {
        Some(accept) => request = request.header(reqwest_header::ACCEPT, accept),
        None => request = request.header(reqwest_header::ACCEPT, "*/*"),
    }

    // Forward Range header for partial content requests
    if let Some(range) = headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
        request = request.header(reqwest_header::RANGE, range);
    }

    if let Some(ref referer) = state.config.referer {
        request = request.header(reqwest::header::REFERER, referer);
    }

    let upstream_response = request.send().await.map_err(|e| {
        let status = if e.is_timeout() {
            StatusCode::GATEWAY_TIMEOUT
        } else {
            StatusCode::BAD_GATEWAY
        };
        tracing::error!("Stream proxy error for {}: {}", url, e);
        (
            status,
            Json(serde_json::json!({
                "error": "Upstream stream unavailable",
                "detail": e.to_string()
            })),
        )
    })?;

    let status = StatusCode::from_u16(upstream_response.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);

    // Content type from upstream, or guessed from the URL
    let content_type = upstream_response
        .headers()
        .get(reqwest_header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| HeaderValue::from_str(s).ok())
        .unwrap_or_else(|| HeaderValue::from_static(guess_content_type(url)));

    let mut response = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    // Read with reqwest constants, write with axum's
    for (upstream_name, name) in PASSTHROUGH_HEADERS.iter() {
        if let Some(value) = upstream_response
            .headers()
            .get(upstream_name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| HeaderValue::from_str(s).ok())
        {
            response = response.header(name, value);
        }
    }

    // Stream the body back
    let body = Body::from_stream(upstream_response.bytes_stream());

    response.body(body).map_err(|e| {
        tracing::error!("Failed to build response: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": "Internal error" })),
        )
    })
}
