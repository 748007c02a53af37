//! Unread signal sources
//!
//! The aggregator and the feed only talk to this trait. The server reads
//! its own services; the client goes over HTTP (`client::ApiClient`).

use std::future::Future;
use std::sync::Arc;

use super::item::NotificationTarget;
use super::{AdminNoticeService, ChatService, PostService};
use crate::data::{AdminNotificationList, Conversation, Post};
use crate::error::AppError;

/// Provider of the three unread signals and their acknowledgements
///
/// Every call is scoped to `viewer`, the authenticated user id.
pub trait NotificationSource: Send + Sync {
    /// Admin notifications addressed to the viewer, with unread count
    fn admin_notifications(
        &self,
        viewer: &str,
    ) -> impl Future<Output = Result<AdminNotificationList, AppError>> + Send;

    /// Conversations the viewer participates in
    fn conversations(
        &self,
        viewer: &str,
    ) -> impl Future<Output = Result<Vec<Conversation>, AppError>> + Send;

    /// Posts owned by the viewer, with embedded comments
    fn own_posts(&self, viewer: &str) -> impl Future<Output = Result<Vec<Post>, AppError>> + Send;

    /// Reset the viewer's unread counter on a conversation
    fn mark_conversation_read(
        &self,
        viewer: &str,
        conversation_id: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Move the comment read cursor of one of the viewer's posts to now
    fn mark_comments_read(
        &self,
        viewer: &str,
        post_id: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Mark one admin notification read
    fn mark_notification_read(
        &self,
        viewer: &str,
        notification_id: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Acknowledge whatever record `target` points at
    fn acknowledge(
        &self,
        viewer: &str,
        target: &NotificationTarget,
    ) -> impl Future<Output = Result<(), AppError>> + Send {
        async move {
            match target {
                NotificationTarget::Conversation { conversation_id } => {
                    self.mark_conversation_read(viewer, conversation_id).await
                }
                NotificationTarget::Post { post_id } => {
                    self.mark_comments_read(viewer, post_id).await
                }
                NotificationTarget::AdminNotification { notification_id } => {
                    self.mark_notification_read(viewer, notification_id).await
                }
            }
        }
    }
}

/// In-process source backed by the service layer
pub struct DatabaseSource {
    chat: Arc<ChatService>,
    posts: Arc<PostService>,
    notices: Arc<AdminNoticeService>,
}

impl DatabaseSource {
    pub fn new(
        chat: Arc<ChatService>,
        posts: Arc<PostService>,
        notices: Arc<AdminNoticeService>,
    ) -> Self {
        Self {
            chat,
            posts,
            notices,
        }
    }
}

impl NotificationSource for DatabaseSource {
    async fn admin_notifications(&self, viewer: &str) -> Result<AdminNotificationList, AppError> {
        self.notices.list_for(viewer).await
    }

    async fn conversations(&self, viewer: &str) -> Result<Vec<Conversation>, AppError> {
        self.chat.conversations(viewer).await
    }

    async fn own_posts(&self, viewer: &str) -> Result<Vec<Post>, AppError> {
        self.posts.own_posts(viewer).await
    }

    async fn mark_conversation_read(
        &self,
        viewer: &str,
        conversation_id: &str,
    ) -> Result<(), AppError> {
        self.chat.mark_read(viewer, conversation_id).await
    }

    async fn mark_comments_read(&self, viewer: &str, post_id: &str) -> Result<(), AppError> {
        self.posts.mark_comments_read(viewer, post_id).await
    }

    async fn mark_notification_read(
        &self,
        viewer: &str,
        notification_id: &str,
    ) -> Result<(), AppError> {
        self.notices.mark_read(viewer, notification_id).await
    }
}
