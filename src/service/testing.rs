//! In-memory notification source for unit tests

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use super::sources::NotificationSource;
use crate::data::{
    AdminNotification, AdminNotificationList, Comment, Conversation, ConversationParticipant,
    LastMessage, Post,
};
use crate::error::AppError;

/// Two-party conversation where `viewer` has `unread` messages from `other`
pub fn conversation(
    id: &str,
    viewer: &str,
    other: &str,
    unread: i64,
    last_at: DateTime<Utc>,
) -> Conversation {
    Conversation {
        id: id.to_string(),
        participants: vec![
            ConversationParticipant {
                user_id: viewer.to_string(),
                username: None,
                unread_count: unread,
            },
            ConversationParticipant {
                user_id: other.to_string(),
                username: Some(other.to_string()),
                unread_count: 0,
            },
        ],
        last_message: Some(LastMessage {
            content: format!("message in {}", id),
            sender_id: other.to_string(),
            created_at: last_at,
        }),
        is_admin_chat: false,
        is_completed: false,
        created_at: last_at,
        updated_at: last_at,
    }
}

/// Post whose read cursor sits at its creation time
pub fn post(
    id: &str,
    owner: &str,
    created_at: DateTime<Utc>,
    comments: &[(&str, DateTime<Utc>)],
) -> Post {
    Post {
        id: id.to_string(),
        owner_id: owner.to_string(),
        content: format!("wanted post {}", id),
        view_count: 0,
        comments_read_at: created_at,
        created_at,
        comments: comments
            .iter()
            .enumerate()
            .map(|(i, (author, at))| Comment {
                id: format!("{}-comment-{}", id, i),
                post_id: id.to_string(),
                author_id: author.to_string(),
                text: format!("comment from {}", author),
                created_at: *at,
            })
            .collect(),
    }
}

pub fn admin_notification(
    id: &str,
    user_id: &str,
    status: &str,
    created_at: DateTime<Utc>,
) -> AdminNotification {
    AdminNotification {
        id: id.to_string(),
        user_id: user_id.to_string(),
        title: format!("notice {}", id),
        body: "please check your listing".to_string(),
        status: status.to_string(),
        created_at,
    }
}

/// Scriptable source: canned data, injectable failures and delays, and a
/// log of every acknowledgement.
#[derive(Default)]
pub struct MemorySource {
    admin: Mutex<Vec<AdminNotification>>,
    conversations: Mutex<Vec<Conversation>>,
    posts: Mutex<Vec<Post>>,
    fail_admin: Mutex<bool>,
    fail_conversations: Mutex<bool>,
    fail_posts: Mutex<bool>,
    conversations_delay: Mutex<Option<Duration>>,
    failing_marks: Mutex<HashSet<String>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    marks: Mutex<Vec<String>>,
    conversation_fetches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started_marks: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_admin(&self, notification: AdminNotification) {
        self.admin.lock().push(notification);
    }

    pub fn add_conversation(&self, conversation: Conversation) {
        self.conversations.lock().push(conversation);
    }

    pub fn add_post(&self, post: Post) {
        self.posts.lock().push(post);
    }

    pub fn fail_admin(&self, fail: bool) {
        *self.fail_admin.lock() = fail;
    }

    pub fn fail_conversations(&self, fail: bool) {
        *self.fail_conversations.lock() = fail;
    }

    pub fn fail_posts(&self, fail: bool) {
        *self.fail_posts.lock() = fail;
    }

    pub fn delay_conversations(&self, delay: Duration) {
        *self.conversations_delay.lock() = Some(delay);
    }

    /// Make acknowledgements of this record id fail
    pub fn fail_mark(&self, id: &str) {
        self.failing_marks.lock().insert(id.to_string());
    }

    /// Block acknowledgements until the semaphore hands out a permit
    pub fn gate_marks(&self, gate: Arc<Semaphore>) {
        *self.gate.lock() = Some(gate);
    }

    /// Acknowledgements completed so far, as `kind:id`
    pub fn marks(&self) -> Vec<String> {
        self.marks.lock().clone()
    }

    /// Poll until at least `count` acknowledgements completed
    pub async fn wait_for_marks(&self, count: usize) -> Vec<String> {
        for _ in 0..200 {
            let marks = self.marks();
            if marks.len() >= count {
                return marks;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.marks()
    }

    pub fn conversation_fetches(&self) -> usize {
        self.conversation_fetches.load(Ordering::SeqCst)
    }

    pub fn started_marks(&self) -> usize {
        self.started_marks.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn record_mark(&self, kind: &str, id: &str) -> Result<(), AppError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.started_marks.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        tokio::task::yield_now().await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.marks.lock().push(format!("{}:{}", kind, id));

        if self.failing_marks.lock().contains(id) {
            return Err(AppError::Upstream(format!("cannot mark {}", id)));
        }
        Ok(())
    }
}

impl NotificationSource for MemorySource {
    async fn admin_notifications(&self, viewer: &str) -> Result<AdminNotificationList, AppError> {
        if *self.fail_admin.lock() {
            return Err(AppError::Upstream("admin notifications unavailable".to_string()));
        }
        let notifications = self
            .admin
            .lock()
            .iter()
            .filter(|notification| notification.user_id == viewer)
            .cloned()
            .collect();
        Ok(AdminNotificationList::new(notifications))
    }

    async fn conversations(&self, viewer: &str) -> Result<Vec<Conversation>, AppError> {
        self.conversation_fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.conversations_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_conversations.lock() {
            return Err(AppError::Upstream("conversations unavailable".to_string()));
        }
        Ok(self
            .conversations
            .lock()
            .iter()
            .filter(|conversation| conversation.is_participant(viewer))
            .cloned()
            .collect())
    }

    async fn own_posts(&self, viewer: &str) -> Result<Vec<Post>, AppError> {
        if *self.fail_posts.lock() {
            return Err(AppError::Upstream("posts unavailable".to_string()));
        }
        Ok(self
            .posts
            .lock()
            .iter()
            .filter(|post| post.owner_id == viewer)
            .cloned()
            .collect())
    }

    async fn mark_conversation_read(
        &self,
        viewer: &str,
        conversation_id: &str,
    ) -> Result<(), AppError> {
        self.record_mark("conversation", conversation_id).await?;
        for conversation in self.conversations.lock().iter_mut() {
            if conversation.id == conversation_id {
                for participant in conversation.participants.iter_mut() {
                    if participant.user_id == viewer {
                        participant.unread_count = 0;
                    }
                }
            }
        }
        Ok(())
    }

    async fn mark_comments_read(&self, _viewer: &str, post_id: &str) -> Result<(), AppError> {
        self.record_mark("post", post_id).await?;
        let now = Utc::now();
        for post in self.posts.lock().iter_mut() {
            if post.id == post_id {
                post.comments_read_at = now;
            }
        }
        Ok(())
    }

    async fn mark_notification_read(
        &self,
        _viewer: &str,
        notification_id: &str,
    ) -> Result<(), AppError> {
        self.record_mark("notification", notification_id).await?;
        for notification in self.admin.lock().iter_mut() {
            if notification.id == notification_id {
                notification.status = "read".to_string();
            }
        }
        Ok(())
    }
}
