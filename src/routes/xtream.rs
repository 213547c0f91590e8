//! Xtream Codes Routes
//!
//! The subset of the Xtream Player API that IPTV apps need to log in, list
//! live channels and start playback. Every answer is built from the cached
//! upstream playlist; stream URLs are the playlist's direct sources.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::StreamMode;
use crate::models::{
    XtreamAuthResponse, XtreamCategory, XtreamLiveStream, XtreamServerInfo, XtreamUserInfo,
};
use crate::routes::{load_playlist, proxy};
use crate::services::m3u_parser::render_m3u;
use crate::AppState;

const M3U_CONTENT_TYPE: &str = "application/x-mpegURL";
const XML_CONTENT_TYPE: &str = "application/xml";

// ============================================================================
// Query Parameters
// ============================================================================

/// player_api.php parameters; accepted from the query string or a form body
#[derive(Debug, Default, Deserialize)]
pub struct PlayerApiParams {
    pub username: Option<String>,
    pub password: Option<String>,
    pub action: Option<String>,
    pub category_id: Option<String>,
}

impl PlayerApiParams {
    /// Form values win over query values
    fn merge(self, form: Option<Self>) -> Self {
        match form {
            Some(form) => Self {
                username: form.username.or(self.username),
                password: form.password.or(self.password),
                action: form.action.or(self.action),
                category_id: form.category_id.or(self.category_id),
            },
            None => self,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CredentialsQuery {
    pub username: Option<String>,
    pub password: Option<String>,
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Public host and port as seen by the client
fn public_host(state: &AppState, headers: &HeaderMap) -> (String, String) {
    if let Some(host) = headers.get(header::HOST).and_then(|v| v.to_str().ok()) {
        return match host.rsplit_once(':') {
            Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
                (name.to_string(), port.to_string())
            }
            _ => (host.to_string(), "80".to_string()),
        };
    }

    if let Some(base) = state
        .config
        .base_url
        .as_deref()
        .and_then(|b| url::Url::parse(b).ok())
    {
        if let Some(host) = base.host_str() {
            let port = base.port_or_known_default().unwrap_or(80);
            return (host.to_string(), port.to_string());
        }
    }

    ("localhost".to_string(), state.config.port.to_string())
}

fn server_info(state: &AppState, headers: &HeaderMap) -> XtreamServerInfo {
    let (url, port) = public_host(state, headers);
    let now = chrono::Utc::now();

    XtreamServerInfo {
        url,
        port,
        https_port: "443".to_string(),
        server_protocol: "http".to_string(),
        rtmp_port: "0".to_string(),
        timezone: "UTC".to_string(),
        timestamp_now: now.timestamp(),
        time_now: now.format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}

fn user_info(state: &AppState, username: &str, password: &str) -> XtreamUserInfo {
    let started_at =
        chrono::Utc::now().timestamp() - state.start_time.elapsed().as_secs() as i64;
    XtreamUserInfo::active(username, password, started_at)
}

fn m3u_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, M3U_CONTENT_TYPE)], body).into_response()
}

// ============================================================================
// Route Handlers
// ============================================================================

/// GET|POST /player_api.php
pub async fn player_api(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<PlayerApiParams>,
    form: Option<Form<PlayerApiParams>>,
) -> Response {
    let params = query.merge(form.map(|Form(form)| form));
    let username = params.username.as_deref().unwrap_or_default();
    let password = params.password.as_deref().unwrap_or_default();

    let Some(user) = state.config.users.authenticate(username, password) else {
        tracing::debug!(username = username, "player_api login rejected");
        return Json(serde_json::json!({
            "user_info": { "auth": 0 },
            "server_info": server_info(&state, &headers),
        }))
        .into_response();
    };

    match params.action.as_deref().unwrap_or_default() {
        "get_live_categories" => {
            let entry = load_playlist(&state, username, user).await;
            let categories: Vec<XtreamCategory> = entry
                .playlist
                .categories
                .iter()
                .map(XtreamCategory::from)
                .collect();
            Json(categories).into_response()
        }
        "get_live_streams" => {
            let entry = load_playlist(&state, username, user).await;
            let added = entry.parsed_at / 1000;
            let category = params
                .category_id
                .as_deref()
                .filter(|id| !id.is_empty() && *id != "*");

            let streams: Vec<XtreamLiveStream> = match category {
                Some(category_id) => entry
                    .playlist
                    .channels_in_category(category_id)
                    .map(|c| XtreamLiveStream::from_channel(c, added))
                    .collect(),
                None => entry
                    .playlist
                    .channels
                    .iter()
                    .map(|c| XtreamLiveStream::from_channel(c, added))
                    .collect(),
            };
            Json(streams).into_response()
        }
        // Live-only front-end: keep clients happy with empty lists
        "get_vod_streams" | "get_vod_categories" | "get_series" | "get_series_categories" => {
            Json(Vec::<serde_json::Value>::new()).into_response()
        }
        "get_short_epg" | "get_simple_data_table" => {
            Json(serde_json::json!({ "epg_listings": [] })).into_response()
        }
        "get_user_info" => Json(user_info(&state, username, password)).into_response(),
        _ => Json(XtreamAuthResponse {
            user_info: user_info(&state, username, password),
            server_info: server_info(&state, &headers),
        })
        .into_response(),
    }
}

/// GET /get.php - M3U playlist with the upstream stream URLs
pub async fn get_playlist(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CredentialsQuery>,
) -> Response {
    let username = query.username.as_deref().unwrap_or_default();
    let password = query.password.as_deref().unwrap_or_default();

    let Some(user) = state.config.users.authenticate(username, password) else {
        return m3u_response("#EXTM3U\n".to_string());
    };

    let entry = load_playlist(&state, username, user).await;
    m3u_response(render_m3u(&entry.playlist.channels))
}

/// GET /xmltv.php - pass-through of the configured XMLTV guide
pub async fn xmltv(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CredentialsQuery>,
) -> Response {
    let username = query.username.as_deref().unwrap_or_default();
    let password = query.password.as_deref().unwrap_or_default();

    let epg_url = match state.config.users.authenticate(username, password) {
        Some(user) => user.epg_url.clone(),
        None => state.config.epg_url.clone(),
    };
    let Some(epg_url) = epg_url else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let timeout = Duration::from_millis(state.config.epg_timeout_ms);
    match state.fetcher.fetch_bytes(&epg_url, Some(timeout)).await {
        Ok(body) => ([(header::CONTENT_TYPE, XML_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            tracing::warn!("EPG fetch failed for {}: {}", epg_url, e);
            (
                [(header::CONTENT_TYPE, XML_CONTENT_TYPE)],
                format!("<!-- EPG fetch error: {} -->", e),
            )
                .into_response()
        }
    }
}

/// GET /live/:username/:password/:stream - `:stream` is `<id>` or `<id>.<ext>`
pub async fn live_stream(
    State(state): State<Arc<AppState>>,
    Path((username, password, stream)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    let Some(user) = state.config.users.authenticate(&username, &password) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let Some(stream_id) = stream
        .split('.')
        .next()
        .and_then(|id| id.parse::<u32>().ok())
    else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let entry = load_playlist(&state, &username, user).await;
    let Some(channel) = entry.playlist.channel(stream_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match state.config.stream_mode {
        StreamMode::Redirect => (
            StatusCode::FOUND,
            [(header::LOCATION, channel.stream_url.clone())],
        )
            .into_response(),
        StreamMode::Proxy => {
            match proxy::forward_stream(&state, &channel.stream_url, &headers).await {
                Ok(response) => response,
                Err(err) => err.into_response(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::*;
    use axum::{body::Body, http::Request};

    #[tokio::test]
    async fn test_player_api_rejects_bad_credentials() {
        let state = seeded_state(test_config()).await;

        let response = get(state, "/player_api.php?username=dad&password=wrong").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["user_info"]["auth"], 0);
        assert!(body["server_info"]["timestamp_now"].is_i64());
    }

    #[tokio::test]
    async fn test_player_api_login() {
        let state = seeded_state(test_config()).await;

        let request = Request::builder()
            .uri("/player_api.php?username=dad&password=devon")
            .header(header::HOST, "iptv.example:8080")
            .body(Body::empty())
            .unwrap();
        let body = body_json(send(state, request).await).await;

        assert_eq!(body["user_info"]["auth"], 1);
        assert_eq!(body["user_info"]["username"], "dad");
        assert_eq!(body["user_info"]["status"], "Active");
        assert_eq!(body["server_info"]["url"], "iptv.example");
        assert_eq!(body["server_info"]["port"], "8080");
    }

    #[tokio::test]
    async fn test_player_api_accepts_form_body() {
        let state = seeded_state(test_config()).await;

        let request = Request::builder()
            .method("POST")
            .uri("/player_api.php")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("username=john&password=pass123&action=get_user_info"))
            .unwrap();
        let body = body_json(send(state, request).await).await;

        assert_eq!(body["username"], "john");
        assert_eq!(body["auth"], 1);
    }

    #[tokio::test]
    async fn test_live_categories() {
        let state = seeded_state(test_config()).await;

        let body = body_json(
            get(
                state,
                "/player_api.php?username=dad&password=devon&action=get_live_categories",
            )
            .await,
        )
        .await;

        assert_eq!(
            body,
            serde_json::json!([
                {"category_id": "1", "category_name": "UK", "parent_id": 0},
                {"category_id": "2", "category_name": "Sport", "parent_id": 0},
            ])
        );
    }

    #[tokio::test]
    async fn test_live_streams() {
        let state = seeded_state(test_config()).await;

        let body = body_json(
            get(
                state,
                "/player_api.php?username=dad&password=devon&action=get_live_streams",
            )
            .await,
        )
        .await;

        let streams = body.as_array().unwrap();
        assert_eq!(streams.len(), 3);
        assert_eq!(streams[0]["stream_id"], 1);
        assert_eq!(streams[0]["name"], "BBC One");
        assert_eq!(streams[0]["stream_type"], "live");
        assert_eq!(streams[0]["stream_icon"], "http://x/logo.png");
        assert_eq!(streams[0]["epg_channel_id"], "bbc1");
        assert_eq!(streams[0]["category_id"], "1");
        assert_eq!(streams[0]["direct_source"], "http://example.com/bbc1.m3u8");
        assert_eq!(streams[1]["stream_icon"], "");
    }

    #[tokio::test]
    async fn test_live_streams_by_category() {
        let state = seeded_state(test_config()).await;

        let body = body_json(
            get(
                state,
                "/player_api.php?username=dad&password=devon&action=get_live_streams&category_id=2",
            )
            .await,
        )
        .await;

        let streams = body.as_array().unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0]["name"], "Sky Sports");
    }

    #[tokio::test]
    async fn test_vod_actions_are_empty() {
        let state = seeded_state(test_config()).await;

        for action in ["get_vod_streams", "get_series", "get_vod_categories"] {
            let uri = format!(
                "/player_api.php?username=dad&password=devon&action={}",
                action
            );
            let body = body_json(get(state.clone(), &uri).await).await;
            assert_eq!(body, serde_json::json!([]), "action {}", action);
        }
    }

    #[tokio::test]
    async fn test_get_php() {
        let state = seeded_state(test_config()).await;

        let response = get(
            state,
            "/get.php?username=dad&password=devon&type=m3u_plus&output=ts",
        )
        .await;
        assert_eq!(response.headers()[header::CONTENT_TYPE], M3U_CONTENT_TYPE);

        let body = body_string(response).await;
        assert!(body.starts_with("#EXTM3U\n"));
        assert!(body.contains(r#"tvg-id="bbc1""#));
        assert!(body.contains(r#"group-title="Sport""#));
        assert!(body.contains("\nhttp://example.com/itv.m3u8\n"));
    }

    #[tokio::test]
    async fn test_get_php_bad_credentials() {
        let state = seeded_state(test_config()).await;

        let body = body_string(get(state, "/get.php?username=dad&password=nope").await).await;
        assert_eq!(body, "#EXTM3U\n");
    }

    #[tokio::test]
    async fn test_xmltv_without_source() {
        let state = seeded_state(test_config()).await;

        let response = get(state, "/xmltv.php?username=dad&password=devon").await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_xmltv_upstream_failure_is_xml_comment() {
        let mut config = test_config();
        // Nothing listens on port 9 of localhost
        config.epg_url = Some("http://127.0.0.1:9/epg.xml".to_string());
        let state = seeded_state(config).await;

        let response = get(state, "/xmltv.php").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], XML_CONTENT_TYPE);
        assert!(body_string(response).await.starts_with("<!-- EPG fetch error:"));
    }

    #[tokio::test]
    async fn test_live_redirect() {
        let state = seeded_state(test_config()).await;

        let response = get(state, "/live/dad/devon/2.m3u8").await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "http://example.com/itv.m3u8"
        );
    }

    #[tokio::test]
    async fn test_live_redirect_without_extension() {
        let state = seeded_state(test_config()).await;

        let response = get(state, "/live/dad/devon/3").await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "http://example.com/sky.m3u8"
        );
    }

    #[tokio::test]
    async fn test_live_errors() {
        let state = seeded_state(test_config()).await;

        let response = get(state.clone(), "/live/dad/wrong/1.ts").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = get(state.clone(), "/live/dad/devon/99.ts").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = get(state, "/live/dad/devon/abc.ts").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
