//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // View counting
    pub static ref VIEW_CACHE_SIZE: IntGauge = IntGauge::new(
        "campusmarket_view_cache_size",
        "Current number of entries in the view deduplication cache"
    ).expect("metric can be created");
    pub static ref VIEWS_COUNTED_TOTAL: IntCounter = IntCounter::new(
        "campusmarket_views_counted_total",
        "Post views that incremented the persisted counter"
    ).expect("metric can be created");
    pub static ref VIEWS_DEDUPLICATED_TOTAL: IntCounter = IntCounter::new(
        "campusmarket_views_deduplicated_total",
        "Post views suppressed by the deduplication window"
    ).expect("metric can be created");
    pub static ref VIEW_CACHE_SWEPT_TOTAL: IntCounter = IntCounter::new(
        "campusmarket_view_cache_swept_total",
        "Stale view cache entries removed by size-triggered sweeps"
    ).expect("metric can be created");

    // Chat event channels
    pub static ref CHAT_CHANNELS_ACTIVE: IntGauge = IntGauge::new(
        "campusmarket_chat_channels_active",
        "Conversation brokers currently held in the registry"
    ).expect("metric can be created");
    pub static ref CHAT_SUBSCRIBERS_ACTIVE: IntGauge = IntGauge::new(
        "campusmarket_chat_subscribers_active",
        "Live chat stream subscribers across all conversations"
    ).expect("metric can be created");
    pub static ref CHAT_EVENTS_PUBLISHED_TOTAL: IntCounter = IntCounter::new(
        "campusmarket_chat_events_published_total",
        "Chat events published to conversation brokers"
    ).expect("metric can be created");
    pub static ref CHAT_SUBSCRIBER_CAP_EXCEEDED_TOTAL: IntCounter = IntCounter::new(
        "campusmarket_chat_subscriber_cap_exceeded_total",
        "Subscriptions accepted past the per-conversation subscriber cap"
    ).expect("metric can be created");

    // Notification aggregation
    pub static ref SOURCE_FETCH_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("campusmarket_source_fetch_failures_total", "Unread source fetches that failed or timed out"),
        &["source"]
    ).expect("metric can be created");
    pub static ref MARK_READ_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("campusmarket_mark_read_failures_total", "Fire-and-forget mark-read calls that failed"),
        &["kind"]
    ).expect("metric can be created");
    pub static ref AGGREGATION_DURATION_SECONDS: prometheus::Histogram = prometheus::Histogram::with_opts(
        HistogramOpts::new(
            "campusmarket_aggregation_duration_seconds",
            "Notification aggregation pass duration in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0])
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("campusmarket_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Record one aggregation pass.
pub fn observe_aggregation(elapsed: Duration) {
    AGGREGATION_DURATION_SECONDS.observe(elapsed.as_secs_f64());
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(VIEW_CACHE_SIZE.clone()))
        .expect("VIEW_CACHE_SIZE can be registered");
    REGISTRY
        .register(Box::new(VIEWS_COUNTED_TOTAL.clone()))
        .expect("VIEWS_COUNTED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(VIEWS_DEDUPLICATED_TOTAL.clone()))
        .expect("VIEWS_DEDUPLICATED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(VIEW_CACHE_SWEPT_TOTAL.clone()))
        .expect("VIEW_CACHE_SWEPT_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CHAT_CHANNELS_ACTIVE.clone()))
        .expect("CHAT_CHANNELS_ACTIVE can be registered");
    REGISTRY
        .register(Box::new(CHAT_SUBSCRIBERS_ACTIVE.clone()))
        .expect("CHAT_SUBSCRIBERS_ACTIVE can be registered");
    REGISTRY
        .register(Box::new(CHAT_EVENTS_PUBLISHED_TOTAL.clone()))
        .expect("CHAT_EVENTS_PUBLISHED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CHAT_SUBSCRIBER_CAP_EXCEEDED_TOTAL.clone()))
        .expect("CHAT_SUBSCRIBER_CAP_EXCEEDED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(SOURCE_FETCH_FAILURES_TOTAL.clone()))
        .expect("SOURCE_FETCH_FAILURES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(MARK_READ_FAILURES_TOTAL.clone()))
        .expect("MARK_READ_FAILURES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(AGGREGATION_DURATION_SECONDS.clone()))
        .expect("AGGREGATION_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
