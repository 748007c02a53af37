//! Signed-in client session
//!
//! Owns one viewer's feed and its poller. A session is built on login and
//! consumed by logout, so nothing from a previous viewer survives.

use std::sync::Arc;

use crate::service::{FeedConfig, FeedPoller, NotificationFeed, NotificationSource, WatermarkStore};

pub struct ClientSession<S: NotificationSource + 'static> {
    feed: Arc<NotificationFeed<S>>,
    poller: FeedPoller,
}

impl<S: NotificationSource + 'static> ClientSession<S> {
    /// Build a fresh feed for `viewer` and start polling
    pub fn login(
        source: Arc<S>,
        viewer: impl Into<String>,
        config: FeedConfig,
        watermark: Arc<dyn WatermarkStore>,
    ) -> Self {
        let feed = Arc::new(NotificationFeed::new(source, viewer, config, watermark));
        let poller = FeedPoller::spawn(Arc::clone(&feed), config.poll_interval);

        tracing::info!(viewer = %feed.viewer(), "Client session started");
        Self { feed, poller }
    }

    pub fn feed(&self) -> &Arc<NotificationFeed<S>> {
        &self.feed
    }

    /// Forward a visibility change to the poller
    pub fn visibility_regained(&self) {
        self.poller.visibility_regained();
    }

    /// Stop polling and drop the feed's local state
    pub async fn logout(self) {
        self.poller.stop().await;
        self.feed.reset().await;
        tracing::info!(viewer = %self.feed.viewer(), "Client session ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::MemoryWatermarkStore;
    use crate::service::testing::{MemorySource, conversation};
    use chrono::Utc;
    use std::time::Duration;

    #[tokio::test]
    async fn login_polls_and_logout_clears() {
        let source = Arc::new(MemorySource::new());
        source.add_conversation(conversation("c1", "v", "seller", 2, Utc::now()));

        let session = ClientSession::login(
            source.clone(),
            "v",
            FeedConfig::default(),
            Arc::new(MemoryWatermarkStore::new()),
        );

        for _ in 0..200 {
            if session.feed().badge().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(session.feed().badge().await, 1);

        let feed = Arc::clone(session.feed());
        session.logout().await;

        assert_eq!(feed.badge().await, 0);
        assert!(feed.items().await.is_empty());

        // Poller is gone: no refresh repopulates the feed
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(feed.items().await.is_empty());
    }
}
