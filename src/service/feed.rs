//! Client-side notification feed
//!
//! Holds the last aggregation result for one viewer, applies local
//! acknowledgements immediately and pushes them to the source in the
//! background. `FeedPoller` keeps the feed fresh.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::aggregator::{AggregatorConfig, aggregate};
use super::item::{NotificationItem, NotificationKind, NotificationTarget};
use super::sources::NotificationSource;
use crate::config::NotificationConfig;
use crate::error::AppError;
use crate::metrics::MARK_READ_FAILURES_TOTAL;

// =============================================================================
// Watermark persistence
// =============================================================================

/// Persistence of the "clear all" watermark
pub trait WatermarkStore: Send + Sync {
    /// Stored watermark, or the Unix epoch when nothing was cleared yet
    fn load(&self) -> DateTime<Utc>;
    fn save(&self, cleared_at: DateTime<Utc>);
}

/// Watermark kept for the lifetime of the process
#[derive(Default)]
pub struct MemoryWatermarkStore {
    cleared_at: parking_lot::Mutex<DateTime<Utc>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WatermarkStore for MemoryWatermarkStore {
    fn load(&self) -> DateTime<Utc> {
        *self.cleared_at.lock()
    }

    fn save(&self, cleared_at: DateTime<Utc>) {
        *self.cleared_at.lock() = cleared_at;
    }
}

#[derive(Serialize, Deserialize)]
struct WatermarkFile {
    cleared_at: DateTime<Utc>,
}

/// Watermark stored as a small JSON document
///
/// Read and write errors are logged; a missing or corrupt file reads as
/// the epoch.
pub struct JsonFileWatermarkStore {
    path: PathBuf,
}

impl JsonFileWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl WatermarkStore for JsonFileWatermarkStore {
    fn load(&self) -> DateTime<Utc> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return DateTime::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read watermark");
                return DateTime::default();
            }
        };

        match serde_json::from_str::<WatermarkFile>(&raw) {
            Ok(file) => file.cleared_at,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring corrupt watermark");
                DateTime::default()
            }
        }
    }

    fn save(&self, cleared_at: DateTime<Utc>) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create watermark directory");
                return;
            }
        }

        let result = serde_json::to_string(&WatermarkFile { cleared_at })
            .map_err(std::io::Error::other)
            .and_then(|json| std::fs::write(&self.path, json));
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to persist watermark");
        }
    }
}

// =============================================================================
// Feed
// =============================================================================

/// Feed tuning
#[derive(Debug, Clone, Copy)]
pub struct FeedConfig {
    pub aggregator: AggregatorConfig,
    /// Conversations acknowledged concurrently by `mark_all_chat_read`
    pub bulk_chunk_size: usize,
    pub poll_interval: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self::from(&NotificationConfig::default())
    }
}

impl From<&NotificationConfig> for FeedConfig {
    fn from(config: &NotificationConfig) -> Self {
        Self {
            aggregator: AggregatorConfig::from(config),
            bulk_chunk_size: config.bulk_chunk_size.max(1),
            poll_interval: config.poll_interval(),
        }
    }
}

/// Outcome of a bulk "mark all chat read"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkReadReport {
    pub batches: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Default)]
struct FeedState {
    items: Vec<NotificationItem>,
    badge: usize,
    admin_unread: usize,
    last_refreshed: Option<DateTime<Utc>>,
}

/// Notification feed of one signed-in viewer
pub struct NotificationFeed<S> {
    source: Arc<S>,
    viewer: String,
    config: FeedConfig,
    watermark: Arc<dyn WatermarkStore>,
    state: RwLock<FeedState>,
}

impl<S: NotificationSource + 'static> NotificationFeed<S> {
    pub fn new(
        source: Arc<S>,
        viewer: impl Into<String>,
        config: FeedConfig,
        watermark: Arc<dyn WatermarkStore>,
    ) -> Self {
        Self {
            source,
            viewer: viewer.into(),
            config,
            watermark,
            state: RwLock::new(FeedState::default()),
        }
    }

    pub fn viewer(&self) -> &str {
        &self.viewer
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Re-aggregate from the source and replace the local list
    ///
    /// # Returns
    /// Number of items now in the feed
    pub async fn refresh(&self) -> usize {
        let cleared_at = self.watermark.load();
        let feed = aggregate(
            self.source.as_ref(),
            &self.viewer,
            cleared_at,
            &self.config.aggregator,
        )
        .await;

        let mut state = self.state.write().await;
        state.items = feed.items;
        state.badge = feed.badge;
        state.admin_unread = feed.admin_unread;
        state.last_refreshed = Some(Utc::now());
        state.items.len()
    }

    pub async fn items(&self) -> Vec<NotificationItem> {
        self.state.read().await.items.clone()
    }

    pub async fn badge(&self) -> usize {
        self.state.read().await.badge
    }

    pub async fn admin_unread(&self) -> usize {
        self.state.read().await.admin_unread
    }

    pub async fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_refreshed
    }

    /// Dismiss one item
    ///
    /// The item leaves the local list and the badge drops by one right
    /// away. The matching mark-read call runs in the background; its
    /// failure is logged and not rolled back.
    ///
    /// # Returns
    /// Where to navigate, or None if the item is no longer in the feed
    pub async fn acknowledge(&self, item_id: &str) -> Option<String> {
        let item = {
            let mut state = self.state.write().await;
            let position = state.items.iter().position(|item| item.id == item_id)?;
            let item = state.items.remove(position);
            state.badge = state.badge.saturating_sub(1);
            if item.kind == NotificationKind::AdminNotification {
                state.admin_unread = state.admin_unread.saturating_sub(1);
            }
            item
        };

        let source = Arc::clone(&self.source);
        let viewer = self.viewer.clone();
        let target = item.target.clone();
        let kind = item.kind;
        tokio::spawn(async move {
            if let Err(e) = source.acknowledge(&viewer, &target).await {
                tracing::warn!(
                    kind = kind.as_str(),
                    record = ?target,
                    error = %e,
                    "Failed to mark notification read"
                );
                MARK_READ_FAILURES_TOTAL
                    .with_label_values(&[kind.as_str()])
                    .inc();
            }
        });

        Some(item.destination())
    }

    /// Mark every unread conversation of the viewer read
    ///
    /// The ids come from the source, so conversations hidden by the
    /// watermark or cut by `max_items` are included. If that fetch fails
    /// the chat items of the local list are used instead.
    ///
    /// Calls go out in chunks of `bulk_chunk_size`; a chunk is awaited
    /// before the next starts. Chat items leave the local list only after
    /// every chunk settled.
    pub async fn mark_all_chat_read(&self) -> BulkReadReport {
        let conversation_ids = match self.unread_conversation_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "Falling back to feed items for bulk mark read");
                let state = self.state.read().await;
                state
                    .items
                    .iter()
                    .filter_map(|item| match &item.target {
                        NotificationTarget::Conversation { conversation_id } => {
                            Some(conversation_id.clone())
                        }
                        _ => None,
                    })
                    .collect()
            }
        };

        let mut report = BulkReadReport::default();
        for chunk in conversation_ids.chunks(self.config.bulk_chunk_size) {
            report.batches += 1;
            let results = join_all(
                chunk
                    .iter()
                    .map(|id| self.source.mark_conversation_read(&self.viewer, id)),
            )
            .await;

            for (id, result) in chunk.iter().zip(results) {
                match result {
                    Ok(()) => report.succeeded += 1,
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(conversation_id = %id, error = %e, "Bulk mark read failed");
                        MARK_READ_FAILURES_TOTAL
                            .with_label_values(&[NotificationKind::Chat.as_str()])
                            .inc();
                    }
                }
            }
        }

        let acknowledged: HashSet<&str> = conversation_ids.iter().map(String::as_str).collect();
        let mut state = self.state.write().await;
        let before = state.items.len();
        state.items.retain(|item| {
            !matches!(
                &item.target,
                NotificationTarget::Conversation { conversation_id }
                    if acknowledged.contains(conversation_id.as_str())
            )
        });
        let removed = before - state.items.len();
        state.badge = state.badge.saturating_sub(removed);

        tracing::info!(
            batches = report.batches,
            succeeded = report.succeeded,
            failed = report.failed,
            "Marked all chats read"
        );
        report
    }

    async fn unread_conversation_ids(&self) -> Result<Vec<String>, AppError> {
        let conversations = tokio::time::timeout(
            self.config.aggregator.fetch_timeout,
            self.source.conversations(&self.viewer),
        )
        .await
        .map_err(|_| AppError::Upstream("conversations fetch timed out".to_string()))??;

        Ok(conversations
            .into_iter()
            .filter(|conversation| conversation.unread_for(&self.viewer) > 0)
            .map(|conversation| conversation.id)
            .collect())
    }

    /// Hide everything currently in the feed
    ///
    /// Moves the watermark to now; later passes only show newer items.
    pub async fn clear_all(&self) {
        let now = Utc::now();
        self.watermark.save(now);

        let mut state = self.state.write().await;
        state.items.clear();
        state.badge = 0;
        state.admin_unread = 0;
    }

    /// Drop all local state (used on logout)
    pub async fn reset(&self) {
        *self.state.write().await = FeedState::default();
    }
}

// =============================================================================
// Poller
// =============================================================================

/// Background refresh loop of one feed
///
/// Refreshes right away, then every poll interval, and immediately when
/// the view becomes visible again.
pub struct FeedPoller {
    visibility: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl FeedPoller {
    pub fn spawn<S: NotificationSource + 'static>(
        feed: Arc<NotificationFeed<S>>,
        interval: Duration,
    ) -> Self {
        let visibility = Arc::new(Notify::new());
        let (shutdown, mut stopped) = watch::channel(false);
        let wake = Arc::clone(&visibility);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = stopped.changed() => break,
                    _ = wake.notified() => ticker.reset(),
                    _ = ticker.tick() => {}
                }

                let items = feed.refresh().await;
                tracing::debug!(viewer = %feed.viewer(), items, "Notification feed refreshed");
            }

            tracing::debug!(viewer = %feed.viewer(), "Notification poller stopped");
        });

        Self {
            visibility,
            shutdown,
            task,
        }
    }

    /// Signal that the view is visible again; triggers one refresh
    pub fn visibility_regained(&self) {
        self.visibility.notify_one();
    }

    /// Stop polling and wait for the loop to exit
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                tracing::error!(error = %e, "Notification poller panicked");
            }
        }
    }
}
