use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::services::cache::{BackoffPolicy, CacheScope};
use crate::services::users::UserDirectory;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid USERS entry '{0}' (expected name:password)")]
    InvalidUserEntry(String),
    #[error("user '{0}' has no playlist_url and M3U_URL is not set")]
    MissingSource(String),
    #[error("invalid URL for {name}: {url} ({source})")]
    InvalidUrl {
        name: String,
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// How `/live/...` requests reach the media
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// 302 to the upstream URL; no video bytes pass through us
    Redirect,
    /// Pass-through proxy of the upstream response
    Proxy,
}

impl FromStr for StreamMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redirect" => Ok(StreamMode::Redirect),
            "proxy" => Ok(StreamMode::Proxy),
            other => Err(format!("unknown stream mode '{}' (use redirect or proxy)", other)),
        }
    }
}

impl std::fmt::Display for StreamMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamMode::Redirect => write!(f, "redirect"),
            StreamMode::Proxy => write!(f, "proxy"),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,
    pub base_url: Option<String>,

    // Sources
    pub epg_url: Option<String>,
    pub users: UserDirectory,

    // Cache
    pub cache_ttl_secs: u64,
    pub cache_scope: CacheScope,
    pub failure_backoff_after: u32,
    pub max_backoff_secs: u64,

    // Upstream fetch
    pub fetch_timeout_ms: u64,
    pub epg_timeout_ms: u64,
    pub max_retries: u32,
    pub max_m3u_size_mb: usize,
    pub user_agent: String,
    pub referer: Option<String>,

    // Streams
    pub stream_mode: StreamMode,
    pub proxy_timeout_ms: u64,

    // Admin
    pub admin_key: Option<String>,
}

/// Read a variable, falling back to `default` when unset or unparsable
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_enum<T: FromStr<Err = String>>(key: &str, default: T) -> Result<T, ConfigError> {
    match env_opt(key) {
        Some(value) => value.parse().map_err(|message| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        }),
        None => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let m3u_url = env_opt("M3U_URL");
        let epg_url = env_opt("EPG_URL");

        let users = UserDirectory::load(
            env_opt("USERS").as_deref(),
            env_opt("USERS_FILE").map(PathBuf::from).as_deref(),
            m3u_url.as_deref(),
            epg_url.as_deref(),
        )?;

        Ok(Self {
            // Server
            port: env_or("PORT", 8000),
            base_url: env_opt("BASE_URL"),

            // Sources
            epg_url,
            users,

            // Cache
            cache_ttl_secs: env_or("CACHE_TTL", 600), // 10 minutes
            cache_scope: env_enum("CACHE_SCOPE", CacheScope::Url)?,
            failure_backoff_after: env_or("FAILURE_BACKOFF_AFTER", 3),
            max_backoff_secs: env_or("MAX_BACKOFF_SECS", 86_400),

            // Upstream fetch
            fetch_timeout_ms: env_or("FETCH_TIMEOUT_MS", 20_000),
            epg_timeout_ms: env_or("EPG_TIMEOUT_MS", 30_000),
            max_retries: env_or("MAX_RETRIES", 1),
            max_m3u_size_mb: env_or("MAX_M3U_SIZE_MB", 200),
            // Use VLC user agent to avoid IPTV server blocks
            user_agent: env_opt("USER_AGENT")
                .unwrap_or_else(|| "VLC/3.0.20 LibVLC/3.0.20".to_string()),
            referer: env_opt("REFERER"),

            // Streams
            stream_mode: env_enum("STREAM_MODE", StreamMode::Redirect)?,
            proxy_timeout_ms: env_or("PROXY_TIMEOUT_MS", 15_000),

            // Admin
            admin_key: env_opt("ADMIN_KEY"),
        })
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            after_failures: self.failure_backoff_after,
            max_backoff_secs: self.max_backoff_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_mode_parse() {
        assert_eq!("redirect".parse::<StreamMode>(), Ok(StreamMode::Redirect));
        assert_eq!(" Proxy ".parse::<StreamMode>(), Ok(StreamMode::Proxy));
        assert!("tunnel".parse::<StreamMode>().is_err());
        assert_eq!(StreamMode::Proxy.to_string(), "proxy");
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        env::set_var("XTREAM_FRONT_TEST_PORT", "not-a-number");
        assert_eq!(env_or("XTREAM_FRONT_TEST_PORT", 8000u16), 8000);
        env::set_var("XTREAM_FRONT_TEST_PORT", " 9000 ");
        assert_eq!(env_or("XTREAM_FRONT_TEST_PORT", 8000u16), 9000);
        env::remove_var("XTREAM_FRONT_TEST_PORT");
    }

    #[test]
    fn test_env_enum_rejects_unknown_value() {
        env::set_var("XTREAM_FRONT_TEST_SCOPE", "tenant");
        let err = env_enum("XTREAM_FRONT_TEST_SCOPE", CacheScope::Url).unwrap_err();
        env::remove_var("XTREAM_FRONT_TEST_SCOPE");

        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "XTREAM_FRONT_TEST_SCOPE"));
    }
}
