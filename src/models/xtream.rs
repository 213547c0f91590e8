//! Xtream Codes Player API response types
//!
//! Shapes of the JSON bodies IPTV client apps expect from `player_api.php`.
//! Xtream servers send most numbers as strings; clients rely on that.

use serde::Serialize;

use super::playlist::{Category, Channel};

/// Main authentication response from player_api.php (no action)
#[derive(Debug, Serialize, Clone)]
pub struct XtreamAuthResponse {
    pub user_info: XtreamUserInfo,
    pub server_info: XtreamServerInfo,
}

/// User account information
#[derive(Debug, Serialize, Clone)]
pub struct XtreamUserInfo {
    pub username: String,
    pub password: String,
    pub message: String,
    pub auth: u8,
    pub status: String,
    pub exp_date: Option<String>,
    pub is_trial: String,
    pub active_cons: String,
    pub created_at: String,
    pub max_connections: String,
    pub allowed_output_formats: Vec<String>,
}

impl XtreamUserInfo {
    /// Active, non-expiring account for an authenticated user
    pub fn active(username: &str, password: &str, created_at: i64) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            message: String::new(),
            auth: 1,
            status: "Active".to_string(),
            exp_date: None,
            is_trial: "0".to_string(),
            active_cons: "0".to_string(),
            created_at: created_at.to_string(),
            max_connections: "1".to_string(),
            allowed_output_formats: vec!["m3u8".to_string(), "ts".to_string()],
        }
    }
}

/// Server information
#[derive(Debug, Serialize, Clone)]
pub struct XtreamServerInfo {
    pub url: String,
    pub port: String,
    pub https_port: String,
    pub server_protocol: String,
    pub rtmp_port: String,
    pub timezone: String,
    pub timestamp_now: i64,
    pub time_now: String,
}

/// Category for live streams
#[derive(Debug, Serialize, Clone)]
pub struct XtreamCategory {
    pub category_id: String,
    pub category_name: String,
    pub parent_id: u32,
}

impl From<&Category> for XtreamCategory {
    fn from(category: &Category) -> Self {
        Self {
            category_id: category.category_id.clone(),
            category_name: category.category_name.clone(),
            parent_id: category.parent_id,
        }
    }
}

/// Live stream (channel) information
#[derive(Debug, Serialize, Clone)]
pub struct XtreamLiveStream {
    pub num: u32,
    pub name: String,
    pub stream_type: String,
    pub stream_id: u32,
    pub stream_icon: String,
    pub epg_channel_id: String,
    pub added: String,
    pub category_id: String,
    pub custom_sid: String,
    pub tv_archive: u8,
    pub direct_source: String,
    pub tv_archive_duration: u32,
}

impl XtreamLiveStream {
    /// `added` is the unix timestamp (seconds) of the parse the channel came from
    pub fn from_channel(channel: &Channel, added: i64) -> Self {
        Self {
            num: channel.stream_id,
            name: channel.name.clone(),
            stream_type: "live".to_string(),
            stream_id: channel.stream_id,
            stream_icon: channel.logo_url.clone(),
            epg_channel_id: channel.epg_id.clone(),
            added: added.to_string(),
            category_id: channel.category_id.clone(),
            custom_sid: String::new(),
            tv_archive: 0,
            direct_source: channel.stream_url.clone(),
            tv_archive_duration: 0,
        }
    }
}
