//! Notification aggregation
//!
//! Merges admin notifications, unread conversations and unread post
//! comments into one newest-first feed. Each source is fetched
//! concurrently and in isolation; a failing source contributes nothing.

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::item::NotificationItem;
use super::sources::NotificationSource;
use crate::config::NotificationConfig;
use crate::data::{AdminNotificationList, Conversation, Post};
use crate::error::AppError;
use crate::metrics::{SOURCE_FETCH_FAILURES_TOTAL, observe_aggregation};

const POST_EXCERPT_CHARS: usize = 30;

/// Aggregation limits
#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig {
    pub max_items: usize,
    pub fetch_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self::from(&NotificationConfig::default())
    }
}

impl From<&NotificationConfig> for AggregatorConfig {
    fn from(config: &NotificationConfig) -> Self {
        Self {
            max_items: config.max_items,
            fetch_timeout: config.fetch_timeout(),
        }
    }
}

/// Result of one aggregation pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatedFeed {
    /// Newest first, at most `max_items`
    pub items: Vec<NotificationItem>,
    /// Badge shown next to the bell; the number of items
    pub badge: usize,
    /// Unread admin notifications as reported by the source
    pub admin_unread: usize,
    /// Sources that failed or timed out during this pass
    #[serde(default)]
    pub failed_sources: Vec<String>,
}

/// Run one aggregation pass for `viewer`
///
/// Only items strictly newer than `cleared_at` are kept.
pub async fn aggregate<S: NotificationSource>(
    source: &S,
    viewer: &str,
    cleared_at: DateTime<Utc>,
    config: &AggregatorConfig,
) -> AggregatedFeed {
    let started = Instant::now();

    let (admin, conversations, posts) = tokio::join!(
        fetch(
            "admin_notifications",
            config.fetch_timeout,
            source.admin_notifications(viewer)
        ),
        fetch(
            "conversations",
            config.fetch_timeout,
            source.conversations(viewer)
        ),
        fetch("comments", config.fetch_timeout, source.own_posts(viewer)),
    );

    let mut failed_sources = Vec::new();
    let admin = admin.unwrap_or_else(|name| {
        failed_sources.push(name.to_string());
        AdminNotificationList::default()
    });
    let conversations = conversations.unwrap_or_else(|name| {
        failed_sources.push(name.to_string());
        Vec::new()
    });
    let posts = posts.unwrap_or_else(|name| {
        failed_sources.push(name.to_string());
        Vec::new()
    });

    let mut items = admin_items(&admin);
    items.extend(chat_items(&conversations, viewer));
    items.extend(comment_items(&posts, viewer));

    items.retain(|item| item.timestamp > cleared_at);
    // sort_by is stable: equal timestamps keep admin, chat, comment order
    items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    items.truncate(config.max_items);

    let elapsed = started.elapsed();
    observe_aggregation(elapsed);
    tracing::debug!(
        viewer = %viewer,
        items = items.len(),
        failed = failed_sources.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Aggregated notifications"
    );

    AggregatedFeed {
        badge: items.len(),
        admin_unread: admin.unread_count,
        items,
        failed_sources,
    }
}

/// Await one source with a deadline, reducing any failure to its name
async fn fetch<T, F>(name: &'static str, timeout: Duration, future: F) -> Result<T, &'static str>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::warn!(source = name, error = %e, "Notification source failed");
            SOURCE_FETCH_FAILURES_TOTAL.with_label_values(&[name]).inc();
            Err(name)
        }
        Err(_) => {
            tracing::warn!(
                source = name,
                timeout_ms = timeout.as_millis() as u64,
                "Notification source timed out"
            );
            SOURCE_FETCH_FAILURES_TOTAL.with_label_values(&[name]).inc();
            Err(name)
        }
    }
}

fn admin_items(list: &AdminNotificationList) -> Vec<NotificationItem> {
    list.notifications
        .iter()
        .filter(|notification| notification.is_unread())
        .map(|notification| {
            NotificationItem::admin_notification(
                &notification.id,
                notification.title.clone(),
                notification.body.clone(),
                notification.created_at,
            )
        })
        .collect()
}

fn chat_items(conversations: &[Conversation], viewer: &str) -> Vec<NotificationItem> {
    conversations
        .iter()
        .filter_map(|conversation| {
            let unread = conversation.unread_for(viewer);
            if unread <= 0 {
                return None;
            }
            let last = conversation.last_message.as_ref()?;

            let others: Vec<&str> = conversation
                .participants
                .iter()
                .filter(|participant| participant.user_id != viewer)
                .map(|participant| participant.display_name())
                .collect();
            let with = if conversation.is_admin_chat {
                format!("Admin ({})", others.join(", "))
            } else {
                others.join(", ")
            };

            Some(NotificationItem::chat(
                &conversation.id,
                format!("{} ({} unread)", with, unread),
                last.content.clone(),
                last.created_at,
                unread as usize,
            ))
        })
        .collect()
}

fn comment_items(posts: &[Post], viewer: &str) -> Vec<NotificationItem> {
    posts
        .iter()
        .filter(|post| post.owner_id == viewer)
        .filter_map(|post| {
            let mut count = 0;
            let mut latest: Option<&crate::data::Comment> = None;
            for comment in post.unread_comments() {
                count += 1;
                if latest.is_none_or(|current| comment.created_at > current.created_at) {
                    latest = Some(comment);
                }
            }
            let latest = latest?;

            let excerpt: String = post.content.chars().take(POST_EXCERPT_CHARS).collect();
            let noun = if count == 1 { "comment" } else { "comments" };

            Some(NotificationItem::comment(
                &post.id,
                format!("{} new {} on \"{}\"", count, noun, excerpt),
                latest.text.clone(),
                latest.created_at,
                count,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::NotificationKind;
    use crate::service::testing::{MemorySource, admin_notification, conversation, post};
    use chrono::Duration as ChronoDuration;

    fn config() -> AggregatorConfig {
        AggregatorConfig {
            max_items: 100,
            fetch_timeout: Duration::from_millis(200),
        }
    }

    fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::default()
    }

    /// Viewer "v" with c1 (3 unread), c2 (1 unread) and post p1 with two
    /// qualifying comments
    fn marketplace_scenario(now: DateTime<Utc>) -> MemorySource {
        let source = MemorySource::new();
        source.add_conversation(conversation("c1", "v", "seller", 3, now - ChronoDuration::minutes(1)));
        source.add_conversation(conversation("c2", "v", "buyer", 1, now - ChronoDuration::minutes(5)));
        source.add_conversation(conversation("c3", "v", "quiet", 0, now));
        source.add_post(post(
            "p1",
            "v",
            now - ChronoDuration::hours(1),
            &[
                ("bob", now - ChronoDuration::minutes(3)),
                ("carol", now - ChronoDuration::minutes(2)),
                ("v", now),
            ],
        ));
        source
    }

    #[tokio::test]
    async fn marketplace_scenario_yields_three_items() {
        let now = Utc::now();
        let source = marketplace_scenario(now);

        let feed = aggregate(&source, "v", epoch(), &config()).await;

        let ids: Vec<&str> = feed.items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["chat_c1", "comment_p1", "chat_c2"]);
        assert_eq!(feed.badge, 3);
        assert_eq!(feed.admin_unread, 0);

        let comment = &feed.items[1];
        assert_eq!(comment.kind, NotificationKind::Comment);
        assert_eq!(comment.unread_count, 2);
        assert_eq!(comment.body, "comment from carol");

        let chat = &feed.items[0];
        assert_eq!(chat.title, "seller (3 unread)");
        assert_eq!(chat.destination(), "/chat/c1");
    }

    #[tokio::test]
    async fn repeated_passes_are_identical() {
        let now = Utc::now();
        let source = marketplace_scenario(now);

        let first = aggregate(&source, "v", epoch(), &config()).await;
        let second = aggregate(&source, "v", epoch(), &config()).await;

        assert_eq!(first.items, second.items);
    }

    #[tokio::test]
    async fn watermark_hides_older_items() {
        let now = Utc::now();
        let source = marketplace_scenario(now);

        let feed = aggregate(&source, "v", now - ChronoDuration::minutes(4), &config()).await;
        let ids: Vec<&str> = feed.items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["chat_c1", "comment_p1"]);

        // An item exactly at the watermark is excluded
        let feed = aggregate(&source, "v", now - ChronoDuration::minutes(2), &config()).await;
        let ids: Vec<&str> = feed.items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["chat_c1"]);
    }

    #[tokio::test]
    async fn unread_admin_notifications_become_items() {
        let now = Utc::now();
        let source = MemorySource::new();
        source.add_admin(admin_notification("n1", "v", "sent", now));
        source.add_admin(admin_notification("n2", "v", "read", now));
        source.add_admin(admin_notification("n3", "v", "pending", now - ChronoDuration::seconds(1)));

        let feed = aggregate(&source, "v", epoch(), &config()).await;

        let ids: Vec<&str> = feed.items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["admin_notif_n1", "admin_notif_n3"]);
        assert_eq!(feed.admin_unread, 2);
    }

    #[tokio::test]
    async fn equal_timestamps_keep_fetch_order() {
        let now = Utc::now();
        let source = MemorySource::new();
        source.add_post(post(
            "p1",
            "v",
            now - ChronoDuration::hours(1),
            &[("bob", now)],
        ));
        source.add_conversation(conversation("c1", "v", "seller", 1, now));
        source.add_admin(admin_notification("n1", "v", "sent", now));

        let feed = aggregate(&source, "v", epoch(), &config()).await;
        let kinds: Vec<NotificationKind> = feed.items.iter().map(|item| item.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NotificationKind::AdminNotification,
                NotificationKind::Chat,
                NotificationKind::Comment
            ]
        );
    }

    #[tokio::test]
    async fn failing_source_is_treated_as_empty() {
        let now = Utc::now();
        let source = marketplace_scenario(now);
        source.add_admin(admin_notification("n1", "v", "sent", now));
        source.fail_admin(true);

        let feed = aggregate(&source, "v", epoch(), &config()).await;

        assert_eq!(feed.items.len(), 3);
        assert_eq!(feed.admin_unread, 0);
        assert_eq!(feed.failed_sources, vec!["admin_notifications".to_string()]);
    }

    #[tokio::test]
    async fn slow_source_times_out() {
        let now = Utc::now();
        let source = marketplace_scenario(now);
        source.delay_conversations(Duration::from_secs(5));

        let feed = aggregate(&source, "v", epoch(), &config()).await;

        let ids: Vec<&str> = feed.items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["comment_p1"]);
        assert_eq!(feed.failed_sources, vec!["conversations".to_string()]);
    }

    #[tokio::test]
    async fn total_failure_yields_empty_feed() {
        let source = marketplace_scenario(Utc::now());
        source.fail_admin(true);
        source.fail_conversations(true);
        source.fail_posts(true);

        let feed = aggregate(&source, "v", epoch(), &config()).await;
        assert!(feed.items.is_empty());
        assert_eq!(feed.badge, 0);
        assert_eq!(feed.failed_sources.len(), 3);
    }

    #[tokio::test]
    async fn feed_is_capped() {
        let now = Utc::now();
        let source = MemorySource::new();
        for i in 0..150 {
            source.add_conversation(conversation(
                &format!("c{i}"),
                "v",
                "seller",
                1,
                now - ChronoDuration::seconds(i),
            ));
        }

        let feed = aggregate(&source, "v", epoch(), &config()).await;

        assert_eq!(feed.items.len(), 100);
        assert_eq!(feed.badge, 100);
        assert_eq!(feed.items[0].id, "chat_c0");
        assert_eq!(feed.items[99].id, "chat_c99");
    }

    #[tokio::test]
    async fn conversation_without_last_message_is_skipped() {
        let now = Utc::now();
        let source = MemorySource::new();
        let mut empty = conversation("c1", "v", "seller", 2, now);
        empty.last_message = None;
        source.add_conversation(empty);

        let feed = aggregate(&source, "v", epoch(), &config()).await;
        assert!(feed.items.is_empty());
    }
}
