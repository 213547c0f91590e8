use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use crate::models::ParsedPlaylist;
use crate::services::metrics::CACHE_LOOKUPS;

/// Source of "now" in unix milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall clock backed by chrono
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// How playlists are keyed in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    /// One entry per upstream URL, shared by every user pointing at it
    Url,
    /// One entry per user, even when users share a URL
    User,
}

impl CacheScope {
    pub fn source_key(&self, username: &str, url: &str) -> String {
        match self {
            CacheScope::Url => url.to_string(),
            CacheScope::User => format!("{}@{}", username, url),
        }
    }
}

impl FromStr for CacheScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "url" => Ok(CacheScope::Url),
            "user" => Ok(CacheScope::User),
            other => Err(format!("unknown cache scope '{}' (use url or user)", other)),
        }
    }
}

/// Stretches the refresh window of a source that keeps failing
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Consecutive failures before the window starts doubling; 0 disables
    pub after_failures: u32,
    /// Upper bound of the stretched window
    pub max_backoff_secs: u64,
}

impl BackoffPolicy {
    /// Freshness window in milliseconds for an entry with `failures`
    /// consecutive fetch failures
    fn window_ms(&self, ttl: Duration, failures: u32) -> i64 {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        if self.after_failures == 0 || failures < self.after_failures {
            return ttl_ms;
        }

        let exponent = (failures - self.after_failures + 1).min(30);
        let cap_ms = i64::try_from(self.max_backoff_secs.saturating_mul(1000))
            .unwrap_or(i64::MAX)
            .max(ttl_ms);
        ttl_ms.saturating_mul(1i64 << exponent).min(cap_ms)
    }
}

/// One cached playlist. Replaced as a whole, never mutated in place.
#[derive(Debug)]
pub struct CacheEntry {
    pub source_key: String,
    pub playlist: Arc<ParsedPlaylist>,
    /// Unix millis of the last fetch attempt, successful or not
    pub fetched_at: i64,
    /// Unix millis of the fetch that produced `playlist`
    pub parsed_at: i64,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

impl CacheEntry {
    pub fn age_secs(&self, now_ms: i64) -> u64 {
        u64::try_from((now_ms - self.fetched_at).max(0) / 1000).unwrap_or(0)
    }
}

/// In-memory playlist cache keyed by source.
///
/// Each source is fetched at most once per TTL window. A failed fetch
/// still advances the entry timestamp and keeps serving the last good
/// playlist (or an empty one if there never was a good one).
pub struct PlaylistCache {
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
    /// Per-key refresh locks; concurrent refreshes of one key are coalesced
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    backoff: BackoffPolicy,
    clock: Arc<dyn Clock>,
}

impl PlaylistCache {
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self::with_clock(backoff, Arc::new(SystemClock))
    }

    pub fn with_clock(backoff: BackoffPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            refresh_locks: Mutex::new(HashMap::new()),
            backoff,
            clock,
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Return the cached playlist for `source_key`, calling `fetch` when the
    /// entry is missing or older than its window.
    pub async fn get<F, Fut, E>(&self, source_key: &str, ttl: Duration, fetch: F) -> Arc<CacheEntry>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ParsedPlaylist, E>>,
        E: Display,
    {
        if let Some(entry) = self.fresh_entry(source_key, ttl).await {
            CACHE_LOOKUPS.with_label_values(&["fresh"]).inc();
            return entry;
        }

        let lock = self.refresh_lock(source_key).await;
        let _guard = lock.lock().await;

        // Refreshed by another caller while we waited on the lock
        if let Some(entry) = self.fresh_entry(source_key, ttl).await {
            CACHE_LOOKUPS.with_label_values(&["fresh"]).inc();
            return entry;
        }

        self.refresh(source_key, fetch).await
    }

    /// Fetch unconditionally, ignoring TTL and backoff
    pub async fn force_refresh<F, Fut, E>(&self, source_key: &str, fetch: F) -> Arc<CacheEntry>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ParsedPlaylist, E>>,
        E: Display,
    {
        let lock = self.refresh_lock(source_key).await;
        let _guard = lock.lock().await;

        self.refresh(source_key, fetch).await
    }

    /// Current entries sorted by key
    pub async fn snapshot(&self) -> Vec<Arc<CacheEntry>> {
        let entries = self.entries.read().await;
        let mut snapshot: Vec<Arc<CacheEntry>> = entries.values().cloned().collect();
        snapshot.sort_by(|a, b| a.source_key.cmp(&b.source_key));
        snapshot
    }

    async fn fresh_entry(&self, source_key: &str, ttl: Duration) -> Option<Arc<CacheEntry>> {
        let entries = self.entries.read().await;
        let entry = entries.get(source_key)?;

        let window = self.backoff.window_ms(ttl, entry.consecutive_failures);
        if self.clock.now_ms() - entry.fetched_at < window {
            Some(Arc::clone(entry))
        } else {
            None
        }
    }

    async fn refresh_lock(&self, source_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        Arc::clone(
            locks
                .entry(source_key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Caller must hold the refresh lock for `source_key`
    async fn refresh<F, Fut, E>(&self, source_key: &str, fetch: F) -> Arc<CacheEntry>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ParsedPlaylist, E>>,
        E: Display,
    {
        let result = fetch().await;
        let now = self.clock.now_ms();
        let previous = self.entries.read().await.get(source_key).cloned();

        let entry = match result {
            Ok(playlist) => {
                tracing::info!(
                    source_key = source_key,
                    channels = playlist.channels.len(),
                    categories = playlist.categories.len(),
                    "playlist refreshed"
                );
                CACHE_LOOKUPS.with_label_values(&["refreshed"]).inc();

                CacheEntry {
                    source_key: source_key.to_string(),
                    playlist: Arc::new(playlist),
                    fetched_at: now,
                    parsed_at: now,
                    last_error: None,
                    consecutive_failures: 0,
                }
            }
            Err(err) => {
                let consecutive_failures = previous
                    .as_ref()
                    .map(|p| p.consecutive_failures.saturating_add(1))
                    .unwrap_or(1);
                let playlist = previous
                    .as_ref()
                    .map(|p| Arc::clone(&p.playlist))
                    .unwrap_or_default();
                let parsed_at = previous.as_ref().map(|p| p.parsed_at).unwrap_or(now);

                tracing::warn!(
                    source_key = source_key,
                    consecutive_failures = consecutive_failures,
                    serving_channels = playlist.channels.len(),
                    error = %err,
                    "playlist refresh failed, serving cached copy"
                );
                let label = if playlist.is_empty() { "empty" } else { "stale" };
                CACHE_LOOKUPS.with_label_values(&[label]).inc();

                CacheEntry {
                    source_key: source_key.to_string(),
                    playlist,
                    fetched_at: now,
                    parsed_at,
                    last_error: Some(err.to_string()),
                    consecutive_failures,
                }
            }
        };

        let entry = Arc::new(entry);
        let mut entries = self.entries.write().await;
        entries.insert(source_key.to_string(), Arc::clone(&entry));
        entry
    }
}
