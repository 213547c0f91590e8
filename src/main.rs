mod config;
mod models;
mod routes;
mod services;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::services::{cache::PlaylistCache, fetcher::PlaylistFetcher};

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub cache: PlaylistCache,
    pub fetcher: PlaylistFetcher,
    /// Client for pass-through streaming; only a connect timeout so live
    /// streams are not cut off
    pub proxy_client: reqwest::Client,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let fetcher = PlaylistFetcher::new(
            &config.user_agent,
            config.referer.clone(),
            config.fetch_timeout_ms,
            config.max_retries,
            config.max_m3u_size_mb,
        )?;

        let proxy_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.proxy_timeout_ms))
            .user_agent(&config.user_agent)
            .no_gzip()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        let cache = PlaylistCache::new(config.backoff_policy());

        Ok(Self {
            config,
            cache,
            fetcher,
            proxy_client,
            start_time: Instant::now(),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xtream_front=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let port = config.port;

    tracing::info!("Starting Xtream front-end v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        users = config.users.len(),
        cache_ttl_secs = config.cache_ttl_secs,
        cache_scope = ?config.cache_scope,
        stream_mode = %config.stream_mode,
        "Configuration loaded"
    );
    if config.users.is_empty() {
        tracing::warn!("No users configured (set USERS or USERS_FILE); every login will fail");
    }

    let state = Arc::new(AppState::new(config)?);
    let app = routes::router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
