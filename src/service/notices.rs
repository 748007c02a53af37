//! Admin notification service

use std::sync::Arc;

use chrono::Utc;

use super::sanitize_content;
use crate::auth::Session;
use crate::data::{
    AdminNotification, AdminNotificationList, Database, EntityId, NotificationStatus,
};
use crate::error::AppError;

const MAX_TITLE_CHARS: usize = 200;
const MAX_BODY_CHARS: usize = 2000;

/// Admin notification service
pub struct AdminNoticeService {
    db: Arc<Database>,
}

impl AdminNoticeService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Send a notification to one user
    ///
    /// Caller must already have checked the admin role.
    pub async fn send(
        &self,
        admin: &Session,
        user_id: &str,
        title: &str,
        body: &str,
    ) -> Result<AdminNotification, AppError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AppError::Validation("user_id is required".to_string()));
        }

        let notification = AdminNotification {
            id: EntityId::new().0,
            user_id: user_id.to_string(),
            title: sanitize_content(title, MAX_TITLE_CHARS)?,
            body: sanitize_content(body, MAX_BODY_CHARS)?,
            status: NotificationStatus::Sent.as_str().to_string(),
            created_at: Utc::now(),
        };
        self.db.insert_admin_notification(&notification).await?;

        tracing::info!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            sent_by = %admin.user_id,
            "Admin notification sent"
        );
        Ok(notification)
    }

    pub async fn list_for(&self, viewer: &str) -> Result<AdminNotificationList, AppError> {
        let notifications = self.db.get_admin_notifications(viewer).await?;
        Ok(AdminNotificationList::new(notifications))
    }

    /// Mark read; only the addressee may do so
    pub async fn mark_read(&self, viewer: &str, notification_id: &str) -> Result<(), AppError> {
        let notification = self
            .db
            .get_admin_notification(notification_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if notification.user_id != viewer {
            return Err(AppError::Forbidden);
        }

        self.db.mark_admin_notification_read(notification_id).await?;
        Ok(())
    }
}
