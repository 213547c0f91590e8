use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

lazy_static! {
    pub static ref UPSTREAM_FETCHES: IntCounterVec = register_int_counter_vec!(
        "xtream_front_upstream_fetches_total",
        "Upstream playlist fetches by outcome",
        &["outcome"]
    )
    .unwrap();
    pub static ref CACHE_LOOKUPS: IntCounterVec = register_int_counter_vec!(
        "xtream_front_cache_lookups_total",
        "Playlist cache lookups by result (fresh, refreshed, stale, empty)",
        &["result"]
    )
    .unwrap();
}

/// Encode the default registry in the Prometheus text format
pub fn gather_metrics() -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}
