//! Derived notification feed items
//!
//! Items are synthesized per aggregation pass and never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which unread signal produced an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Chat,
    Comment,
    AdminNotification,
}

impl NotificationKind {
    /// Prefix of item ids of this kind
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Chat => "chat_",
            Self::Comment => "comment_",
            Self::AdminNotification => "admin_notif_",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Comment => "comment",
            Self::AdminNotification => "admin_notification",
        }
    }
}

/// Record an item points at, used to acknowledge it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationTarget {
    Conversation { conversation_id: String },
    Post { post_id: String },
    AdminNotification { notification_id: String },
}

/// One entry of the unified notification feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationItem {
    /// `chat_{conversation}`, `comment_{post}` or `admin_notif_{notification}`
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    /// Unread messages or comments folded into this item
    pub unread_count: usize,
    pub target: NotificationTarget,
}

impl NotificationItem {
    pub fn chat(
        conversation_id: &str,
        title: String,
        body: String,
        timestamp: DateTime<Utc>,
        unread_count: usize,
    ) -> Self {
        Self {
            id: format!("{}{}", NotificationKind::Chat.id_prefix(), conversation_id),
            kind: NotificationKind::Chat,
            title,
            body,
            timestamp,
            unread_count,
            target: NotificationTarget::Conversation {
                conversation_id: conversation_id.to_string(),
            },
        }
    }

    pub fn comment(
        post_id: &str,
        title: String,
        body: String,
        timestamp: DateTime<Utc>,
        unread_count: usize,
    ) -> Self {
        Self {
            id: format!("{}{}", NotificationKind::Comment.id_prefix(), post_id),
            kind: NotificationKind::Comment,
            title,
            body,
            timestamp,
            unread_count,
            target: NotificationTarget::Post {
                post_id: post_id.to_string(),
            },
        }
    }

    pub fn admin_notification(
        notification_id: &str,
        title: String,
        body: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!(
                "{}{}",
                NotificationKind::AdminNotification.id_prefix(),
                notification_id
            ),
            kind: NotificationKind::AdminNotification,
            title,
            body,
            timestamp,
            unread_count: 1,
            target: NotificationTarget::AdminNotification {
                notification_id: notification_id.to_string(),
            },
        }
    }

    /// Client route the viewer is sent to after acknowledging the item
    pub fn destination(&self) -> String {
        match &self.target {
            NotificationTarget::Conversation { conversation_id } => {
                format!("/chat/{}", conversation_id)
            }
            NotificationTarget::Post { post_id } => format!("/messages/{}", post_id),
            NotificationTarget::AdminNotification { notification_id } => {
                format!("/notifications/{}", notification_id)
            }
        }
    }
}
