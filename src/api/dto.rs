//! Request and query payloads of the REST API
//!
//! Responses reuse the data models directly.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// POST /api/v1/conversations
#[derive(Debug, Deserialize)]
pub struct OpenConversationRequest {
    /// Other participants; the caller is always included
    pub participant_ids: Vec<String>,
    #[serde(default)]
    pub is_admin_chat: bool,
}

/// POST /api/v1/conversations/:id/messages
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// GET /api/v1/conversations/:id/messages
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

/// POST /api/v1/posts
#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
}

/// POST /api/v1/posts/:id/comments
#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub text: String,
}

/// POST /api/v1/admin/notifications
#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    pub user_id: String,
    pub title: String,
    pub body: String,
}

/// GET /api/v1/notifications/feed
#[derive(Debug, Default, Deserialize)]
pub struct FeedParams {
    /// Watermark; items at or before it are hidden
    pub cleared_at: Option<DateTime<Utc>>,
}
