pub mod admin;
pub mod health;
pub mod proxy;
pub mod xtream;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::{
        predicate::{DefaultPredicate, NotForContentType, Predicate},
        CompressionLayer,
    },
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::services::cache::CacheEntry;
use crate::services::users::UserEntry;
use crate::AppState;

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    // Proxied media must reach the player byte-for-byte
    let compression = CompressionLayer::new().compress_when(
        DefaultPredicate::new().and(NotForContentType::const_new("video/")),
    );

    Router::new()
        // Health endpoints
        .route("/", get(health::root))
        .route("/healthz", get(health::healthz))
        .route("/metrics", get(health::metrics))
        // Xtream Codes surface
        .route(
            "/player_api.php",
            get(xtream::player_api).post(xtream::player_api),
        )
        .route("/get.php", get(xtream::get_playlist))
        .route("/xmltv.php", get(xtream::xmltv))
        .route(
            "/live/:username/:password/:stream",
            get(xtream::live_stream),
        )
        // Admin endpoints (protected by ADMIN_KEY)
        .route("/api/admin/refresh", post(admin::refresh_sources))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(compression)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Cached playlist for an authenticated user, refreshed from upstream when stale
pub(crate) async fn load_playlist(
    state: &AppState,
    username: &str,
    user: &UserEntry,
) -> Arc<CacheEntry> {
    let key = state
        .config
        .cache_scope
        .source_key(username, &user.playlist_url);
    let ttl = Duration::from_secs(state.config.cache_ttl_secs);

    state
        .cache
        .get(&key, ttl, move || state.fetcher.fetch_playlist(&user.playlist_url))
        .await
}
