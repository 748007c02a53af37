//! Data models
//!
//! Rust structs representing database entities.
//! All models use ULID for IDs and chrono for timestamps.
//! They double as the JSON wire format of the REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// User
// =============================================================================

/// Marketplace user, as far as this service needs to know it
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    /// "user" or "admin"
    pub role: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Conversation
// =============================================================================

/// A chat thread between buyers and sellers (or a user and an admin)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    /// Participants in the order the conversation was opened with
    pub participants: Vec<ConversationParticipant>,
    pub last_message: Option<LastMessage>,
    pub is_admin_chat: bool,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Unread counter of one participant (0 for non-participants)
    pub fn unread_for(&self, user_id: &str) -> i64 {
        self.participants
            .iter()
            .find(|participant| participant.user_id == user_id)
            .map(|participant| participant.unread_count)
            .unwrap_or(0)
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants
            .iter()
            .any(|participant| participant.user_id == user_id)
    }
}

/// One participant and their unread counter
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConversationParticipant {
    pub user_id: String,
    /// Resolved from `users`, absent if the user never wrote anything
    pub username: Option<String>,
    pub unread_count: i64,
}

impl ConversationParticipant {
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.user_id)
    }
}

/// Summary of the most recent chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    pub sender_id: String,
    pub created_at: DateTime<Utc>,
}

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Posts ("wanted" messages) and comments
// =============================================================================

/// A wanted post with its embedded comment thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub owner_id: String,
    pub content: String,
    pub view_count: i64,
    /// Last time the owner acknowledged comments
    pub comments_read_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Post {
    /// Comments the owner has not seen yet
    ///
    /// A comment is unread when another user wrote it after `comments_read_at`.
    pub fn unread_comments(&self) -> impl Iterator<Item = &Comment> {
        self.comments.iter().filter(|comment| {
            comment.author_id != self.owner_id && comment.created_at > self.comments_read_at
        })
    }
}

/// A comment on a post
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Admin notifications
// =============================================================================

/// A message from the moderation team to one user
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AdminNotification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub body: String,
    /// Values: sent, read, pending
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl AdminNotification {
    pub fn is_unread(&self) -> bool {
        self.status != NotificationStatus::Read.as_str()
    }
}

/// Delivery state of an admin notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Sent,
    Read,
    Pending,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Read => "read",
            Self::Pending => "pending",
        }
    }
}

/// Admin notifications of one user plus their unread count
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminNotificationList {
    pub notifications: Vec<AdminNotification>,
    pub unread_count: usize,
}

impl AdminNotificationList {
    pub fn new(notifications: Vec<AdminNotification>) -> Self {
        let unread_count = notifications.iter().filter(|n| n.is_unread()).count();
        Self {
            notifications,
            unread_count,
        }
    }
}
