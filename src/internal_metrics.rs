//! # Internal Metrics
//!
//! Metric names and helpers for the collector framework and the background
//! preloader. Metrics go through the `metrics` facade; installing a recorder
//! (Prometheus, logging, in-memory for tests) is up to the embedding
//! application. With no recorder installed every call is a no-op.

use metrics::Unit;

/// The public API for the metrics system.
///
/// Each helper emits through the facade at call time, so a recorder installed
/// after this handle was created still receives the updates.
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    _private: (),
}

impl Metrics {
    /// Creates a new `Metrics` handle and registers descriptions for all
    /// supported metrics with the global recorder.
    pub fn new() -> Self {
        metrics::describe_counter!("collector_failures_total", Unit::Count, "Periodic collections that failed, labeled by collector.");
        metrics::describe_counter!("collector_skips_total", Unit::Count, "Periodic collections that had no value yet, labeled by collector.");
        metrics::describe_counter!("bg_images_fetched_total", Unit::Count, "Background images received from providers.");
        metrics::describe_counter!("bg_provider_fallbacks_total", Unit::Count, "Fetch tasks that fell back to the local provider, labeled by the failing provider.");
        metrics::describe_counter!("bg_fire_total", Unit::Count, "Requests that found the preload queue empty.");
        metrics::describe_counter!("bg_fire_timeouts_total", Unit::Count, "Firing waits that hit the timeout ceiling.");
        metrics::describe_counter!("bg_local_fallbacks_total", Unit::Count, "Requests served by reading a local file directly.");
        metrics::describe_counter!("bg_placeholders_total", Unit::Count, "Requests answered with the empty placeholder image.");
        metrics::describe_counter!("bg_cache_errors_total", Unit::Count, "Cache directory I/O failures, labeled by operation.");
        metrics::describe_gauge!("bg_queue_length", Unit::Count, "Ready background images waiting in the preload queue.");

        Self { _private: () }
    }

    pub fn increment_collector_failure(&self, collector: &str) {
        metrics::counter!("collector_failures_total", "collector" => collector.to_string()).increment(1);
    }

    pub fn increment_collector_skip(&self, collector: &str) {
        metrics::counter!("collector_skips_total", "collector" => collector.to_string()).increment(1);
    }

    pub fn increment_images_fetched(&self, count: u64) {
        metrics::counter!("bg_images_fetched_total").increment(count);
    }

    /// Increments the counter for fetch tasks that had to use the local provider.
    pub fn increment_provider_fallback(&self, provider: &str) {
        metrics::counter!("bg_provider_fallbacks_total", "provider" => provider.to_string()).increment(1);
    }

    pub fn increment_fire(&self) {
        metrics::counter!("bg_fire_total").increment(1);
    }

    pub fn increment_fire_timeout(&self) {
        metrics::counter!("bg_fire_timeouts_total").increment(1);
    }

    pub fn increment_local_fallback(&self) {
        metrics::counter!("bg_local_fallbacks_total").increment(1);
    }

    pub fn increment_placeholder(&self) {
        metrics::counter!("bg_placeholders_total").increment(1);
    }

    /// Increments the counter for cache I/O failures (`op` is "write", "read" or "purge").
    pub fn increment_cache_error(&self, op: &'static str) {
        metrics::counter!("bg_cache_errors_total", "op" => op).increment(1);
    }

    pub fn set_queue_length(&self, len: usize) {
        metrics::gauge!("bg_queue_length").set(len as f64);
    }
}
