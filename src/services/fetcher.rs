//! Upstream HTTP fetches for playlists and XMLTV guides.

use axum::body::Bytes;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

use crate::models::ParsedPlaylist;
use crate::services::m3u_parser;
use crate::services::metrics::UPSTREAM_FETCHES;

/// Any reason an upstream fetch did not produce a body.
/// The playlist cache treats every variant the same way.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("upstream request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {reason}")]
    Http { status: u16, reason: String },
    #[error("body too large: {size_mb:.1}MB (limit {limit_mb}MB)")]
    TooLarge { size_mb: f64, limit_mb: usize },
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

impl FetchError {
    fn from_status(status: StatusCode) -> Self {
        FetchError::Http {
            status: status.as_u16(),
            reason: status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis((1u64 << attempt.min(5)).saturating_mul(500).min(10_000))
}

/// HTTP client for upstream playlist and EPG sources
#[derive(Clone)]
pub struct PlaylistFetcher {
    client: Client,
    referer: Option<String>,
    max_retries: u32,
    max_size_mb: usize,
}

impl PlaylistFetcher {
    pub fn new(
        user_agent: &str,
        referer: Option<String>,
        timeout_ms: u64,
        max_retries: u32,
        max_size_mb: usize,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_millis(timeout_ms))
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            referer,
            max_retries,
            max_size_mb,
        })
    }

    async fn fetch_with_retry(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<Response, FetchError> {
        let mut attempt = 0u32;

        loop {
            let mut request = self.client.get(url);
            if let Some(ref referer) = self.referer {
                request = request.header(reqwest::header::REFERER, referer);
            }
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }

            let err = match request.send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    FetchError::from_status(resp.status())
                }
                Ok(resp) => return Err(FetchError::from_status(resp.status())),
                Err(err) => err.into(),
            };

            if attempt >= self.max_retries {
                return Err(err);
            }

            let wait = backoff(attempt);
            attempt += 1;
            tracing::warn!(
                fetch_retry = attempt,
                reason = %err,
                backoff_ms = wait.as_millis() as u64,
                "retrying upstream fetch"
            );
            sleep(wait).await;
        }
    }

    fn check_size(&self, len: u64) -> Result<(), FetchError> {
        let max_bytes = (self.max_size_mb as u64) * 1024 * 1024;
        if len > max_bytes {
            return Err(FetchError::TooLarge {
                size_mb: len as f64 / 1024.0 / 1024.0,
                limit_mb: self.max_size_mb,
            });
        }
        Ok(())
    }

    /// GET a URL and return the whole body; non-2xx is an error.
    /// `timeout` overrides the client's default request timeout.
    pub async fn fetch_bytes(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<Bytes, FetchError> {
        let response = self.fetch_with_retry(url, timeout).await?;

        if let Some(len) = response.content_length() {
            self.check_size(len)?;
        }

        let body = response.bytes().await?;
        self.check_size(body.len() as u64)?;
        Ok(body)
    }

    /// Fetch and parse an M3U playlist
    pub async fn fetch_playlist(&self, url: &str) -> Result<ParsedPlaylist, FetchError> {
        let result = self.fetch_bytes(url, None).await;
        match result {
            Ok(body) => {
                UPSTREAM_FETCHES.with_label_values(&["success"]).inc();
                tracing::debug!(
                    "Playlist size: {:.2} MB",
                    body.len() as f64 / 1024.0 / 1024.0
                );
                Ok(m3u_parser::parse_bytes(&body))
            }
            Err(err) => {
                UPSTREAM_FETCHES.with_label_values(&["failure"]).inc();
                Err(err)
            }
        }
    }
}
