//! In-memory view deduplication cache
//!
//! Volatile, cleared on restart. Keeps the last time a session viewed a
//! resource so refreshes don't inflate persisted view counters.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::config::ViewConfig;

/// Derive a weak session identity from client address and user agent
///
/// Two users behind the same NAT with the same browser collide; that
/// undercount is accepted.
pub fn session_fingerprint(ip: &str, user_agent: &str) -> String {
    let digest = Sha256::digest(format!("{}|{}", ip.trim(), user_agent.trim()).as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Cache key for one (session, resource) pair
pub fn view_key(fingerprint: &str, resource_id: &str) -> String {
    format!("{}:{}", fingerprint, resource_id)
}

/// View deduplication cache
///
/// Key -> last time the view was counted. An entry older than the dedup
/// window is logically expired even while it still sits in the map.
pub struct ViewCache {
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
    dedup_window: Duration,
    sweep_threshold: usize,
    sweep_max_age: Duration,
}

impl ViewCache {
    /// Create a cache with the default 30 minute window, sweeping entries
    /// older than one hour once more than 10,000 are held.
    pub fn new() -> Self {
        Self::with_config(&ViewConfig::default())
    }

    pub fn with_config(config: &ViewConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            dedup_window: Duration::seconds(config.dedup_window_seconds),
            sweep_threshold: config.sweep_threshold.max(1),
            sweep_max_age: Duration::seconds(config.sweep_max_age_seconds),
        }
    }

    /// Record a view happening now
    ///
    /// # Returns
    /// true if the caller should increment the persisted view counter
    pub async fn record_view(&self, key: &str) -> bool {
        self.record_view_at(key, Utc::now()).await
    }

    /// Record a view at an explicit instant
    pub async fn record_view_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries.write().await;

        if let Some(last_seen) = entries.get(key) {
            if now - *last_seen < self.dedup_window {
                crate::metrics::VIEWS_DEDUPLICATED_TOTAL.inc();
                return false;
            }
        }

        entries.insert(key.to_string(), now);

        if entries.len() > self.sweep_threshold {
            let removed = Self::sweep_locked(&mut entries, now, self.sweep_max_age);
            tracing::debug!(removed, remaining = entries.len(), "Swept view cache");
            crate::metrics::VIEW_CACHE_SWEPT_TOTAL.inc_by(removed as u64);
        }

        crate::metrics::VIEWS_COUNTED_TOTAL.inc();
        crate::metrics::VIEW_CACHE_SIZE.set(entries.len() as i64);

        true
    }

    fn sweep_locked(
        entries: &mut HashMap<String, DateTime<Utc>>,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> usize {
        let before = entries.len();
        entries.retain(|_, last_seen| now - *last_seen < max_age);
        before - entries.len()
    }

    /// Whether a view for `key` would currently be deduplicated
    pub async fn is_fresh(&self, key: &str, now: DateTime<Utc>) -> bool {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .is_some_and(|last_seen| now - *last_seen < self.dedup_window)
    }

    /// Number of physically stored entries (fresh or stale)
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for ViewCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repeat_view_within_window_is_not_counted() {
        let cache = ViewCache::new();
        let start = Utc::now();
        let key = view_key(&session_fingerprint("10.0.0.1", "Firefox/128"), "post-1");

        assert!(cache.record_view_at(&key, start).await);
        assert!(
            !cache
                .record_view_at(&key, start + Duration::minutes(29))
                .await
        );
        assert!(
            cache
                .record_view_at(&key, start + Duration::minutes(31))
                .await
        );
    }

    #[tokio::test]
    async fn suppressed_view_does_not_extend_window() {
        let cache = ViewCache::new();
        let start = Utc::now();

        assert!(cache.record_view_at("k", start).await);
        assert!(!cache.record_view_at("k", start + Duration::minutes(20)).await);
        // 31 minutes after the counted view, 11 after the suppressed one
        assert!(cache.record_view_at("k", start + Duration::minutes(31)).await);
    }

    #[tokio::test]
    async fn different_resources_are_counted_separately() {
        let cache = ViewCache::new();
        let fingerprint = session_fingerprint("10.0.0.1", "Safari/17");
        let now = Utc::now();

        assert!(cache.record_view_at(&view_key(&fingerprint, "a"), now).await);
        assert!(cache.record_view_at(&view_key(&fingerprint, "b"), now).await);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn crossing_threshold_sweeps_stale_entries() {
        let cache = ViewCache::new();
        let old = Utc::now() - Duration::minutes(90);
        let now = Utc::now();

        for i in 0..10_000 {
            assert!(cache.record_view_at(&format!("old-{i}"), old).await);
        }
        assert_eq!(cache.len().await, 10_000);

        assert!(cache.record_view_at("fresh", now).await);

        assert_eq!(cache.len().await, 1);
        assert!(cache.is_fresh("fresh", now).await);
    }

    #[tokio::test]
    async fn sweep_keeps_entries_younger_than_max_age() {
        let config = ViewConfig {
            dedup_window_seconds: 1800,
            sweep_threshold: 3,
            sweep_max_age_seconds: 3600,
        };
        let cache = ViewCache::with_config(&config);
        let now = Utc::now();

        cache.record_view_at("stale", now - Duration::minutes(61)).await;
        cache.record_view_at("recent", now - Duration::minutes(45)).await;
        cache.record_view_at("new", now - Duration::minutes(1)).await;
        assert_eq!(cache.len().await, 3);

        cache.record_view_at("newest", now).await;
        assert_eq!(cache.len().await, 3);
        assert!(!cache.is_fresh("recent", now).await);
    }

    #[test]
    fn fingerprint_is_stable_and_key_safe() {
        let a = session_fingerprint("192.168.1.20", "Mozilla/5.0 (X11; Linux)");
        let b = session_fingerprint("192.168.1.20", "Mozilla/5.0 (X11; Linux)");
        let c = session_fingerprint("192.168.1.21", "Mozilla/5.0 (X11; Linux)");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(
            a.chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
        );
    }
}
