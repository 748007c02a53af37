//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services orchestrate database, view cache and chat event operations;
//! the notification mechanism (aggregator, feed, poller) sits on top of
//! the `NotificationSource` trait.

pub mod aggregator;
mod chat;
pub mod events;
pub mod feed;
mod item;
mod notices;
mod posts;
pub mod sources;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::{AggregatedFeed, AggregatorConfig, aggregate};
pub use chat::ChatService;
pub use events::{ChatEvent, ChatEventRegistry, ChatSubscription};
pub use feed::{
    BulkReadReport, FeedConfig, FeedPoller, JsonFileWatermarkStore, MemoryWatermarkStore,
    NotificationFeed, WatermarkStore,
};
pub use item::{NotificationItem, NotificationKind, NotificationTarget};
pub use notices::AdminNoticeService;
pub use posts::PostService;
pub use sources::{DatabaseSource, NotificationSource};

use chrono::Utc;

use crate::auth::Session;
use crate::data::{Database, User};
use crate::error::AppError;

/// Strip markup from user supplied text and enforce a length limit
///
/// Content is stored and served as plain text: tags are removed (script
/// and style bodies included) and the entities the HTML serializer adds
/// are decoded again, so `<`, `&` and quotes survive unchanged.
pub(crate) fn sanitize_content(raw: &str, max_chars: usize) -> Result<String, AppError> {
    let stripped = ammonia::Builder::empty().clean(raw.trim()).to_string();
    let decoded = html_escape::decode_html_entities(&stripped);
    let cleaned = decoded.trim();

    if cleaned.is_empty() {
        return Err(AppError::Validation("content must not be empty".to_string()));
    }
    if cleaned.chars().count() > max_chars {
        return Err(AppError::Validation(format!(
            "content exceeds {} characters",
            max_chars
        )));
    }

    Ok(cleaned.to_string())
}

/// Record the author of a write so other participants see a display name
pub(crate) async fn remember_author(db: &Database, session: &Session) -> Result<(), AppError> {
    db.upsert_user(&User {
        id: session.user_id.clone(),
        username: session.username.clone(),
        role: session.role.clone(),
        created_at: Utc::now(),
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_scripts_and_keeps_text() {
        let cleaned = sanitize_content("  hi <script>alert(1)</script>there ", 100).unwrap();
        assert_eq!(cleaned, "hi there");
    }

    #[test]
    fn sanitize_keeps_plain_text_characters() {
        let cleaned = sanitize_content("Price 5 < 10 & \"cheap\" <3", 100).unwrap();
        assert_eq!(cleaned, "Price 5 < 10 & \"cheap\" <3");
    }

    #[test]
    fn sanitize_drops_all_tags() {
        let cleaned = sanitize_content("<b>desk</b> <a href=\"x\">lamp</a> & chair", 100).unwrap();
        assert_eq!(cleaned, "desk lamp & chair");
    }

    #[test]
    fn sanitize_rejects_empty_and_oversized() {
        assert!(matches!(
            sanitize_content("   ", 10),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            sanitize_content("<script>x</script>", 10),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            sanitize_content("abcdefghijk", 10),
            Err(AppError::Validation(_))
        ));
    }
}
