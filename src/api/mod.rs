//! API layer
//!
//! HTTP handlers for:
//! - Conversations and live chat streams
//! - Posts, comments and view counting
//! - Notifications (admin notifications and the aggregated feed)
//! - Admin API
//! - Metrics (Prometheus)

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::AppState;

mod admin;
mod conversations;
mod dto;
pub mod metrics;
mod notifications;
mod posts;
mod streaming;

pub use admin::admin_router;
pub use dto::*;
pub use metrics::metrics_router;

/// Create the versioned REST router, nested under `/api`
///
/// Everything requires a session except `GET /v1/posts/:id`.
pub fn api_router() -> Router<AppState> {
    Router::new()
        // Conversations
        .route(
            "/v1/conversations",
            get(conversations::list_conversations).post(conversations::open_conversation),
        )
        .route(
            "/v1/conversations/:id/messages",
            get(conversations::list_messages).post(conversations::send_message),
        )
        .route("/v1/conversations/:id/read", post(conversations::mark_read))
        .route(
            "/v1/conversations/:id/complete",
            post(conversations::complete),
        )
        .route(
            "/v1/conversations/:id/stream",
            get(streaming::stream_conversation),
        )
        // Posts and comments
        .route("/v1/posts", post(posts::create_post))
        .route("/v1/posts/mine", get(posts::my_posts))
        .route("/v1/posts/:id", get(posts::get_post))
        .route("/v1/posts/:id/comments", post(posts::add_comment))
        .route(
            "/v1/posts/:id/comments/read",
            post(posts::mark_comments_read),
        )
        .route(
            "/v1/posts/:id/comments/:comment_id",
            delete(posts::delete_comment),
        )
        // Notifications
        .route("/v1/notifications", get(notifications::list_notifications))
        .route(
            "/v1/notifications/feed",
            get(notifications::notification_feed),
        )
        .route(
            "/v1/notifications/:id/read",
            post(notifications::mark_notification_read),
        )
        // Admin
        .nest("/v1/admin", admin_router())
}
