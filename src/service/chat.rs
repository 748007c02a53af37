//! Chat service
//!
//! Conversations between buyers and sellers. Every state change is
//! persisted first and then published on the conversation's event channel.

use std::sync::Arc;

use super::events::{ChatEvent, ChatEventRegistry, ChatSubscription};
use super::{remember_author, sanitize_content};
use crate::auth::{ADMIN_ROLE, Session};
use crate::data::{ChatMessage, Conversation, Database};
use crate::error::AppError;

const MAX_MESSAGE_CHARS: usize = 2000;
const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 200;

/// Chat service
pub struct ChatService {
    db: Arc<Database>,
    events: Arc<ChatEventRegistry>,
}

impl ChatService {
    /// Create new chat service
    pub fn new(db: Arc<Database>, events: Arc<ChatEventRegistry>) -> Self {
        Self { db, events }
    }

    /// Conversations of a user, most recently active first
    pub async fn conversations(&self, viewer: &str) -> Result<Vec<Conversation>, AppError> {
        self.db.get_conversations_for_user(viewer).await
    }

    /// Get or create the conversation between the initiator and `participant_ids`
    ///
    /// An admin chat needs an admin on board, either the initiator or one of
    /// the invited participants.
    pub async fn open(
        &self,
        initiator: &Session,
        participant_ids: Vec<String>,
        is_admin_chat: bool,
    ) -> Result<Conversation, AppError> {
        if is_admin_chat && !initiator.is_admin() {
            let mut has_admin = false;
            for id in &participant_ids {
                if let Some(user) = self.db.get_user(id).await? {
                    if user.role == ADMIN_ROLE {
                        has_admin = true;
                        break;
                    }
                }
            }
            if !has_admin {
                return Err(AppError::Validation(
                    "admin chat requires an admin participant".to_string(),
                ));
            }
        }

        let mut participants = Vec::with_capacity(participant_ids.len() + 1);
        participants.push(initiator.user_id.clone());
        participants.extend(participant_ids);

        remember_author(&self.db, initiator).await?;
        let conversation = self
            .db
            .get_or_create_conversation(&participants, is_admin_chat)
            .await?;

        tracing::debug!(
            conversation_id = %conversation.id,
            participants = conversation.participants.len(),
            "Conversation opened"
        );
        Ok(conversation)
    }

    /// Load a conversation the viewer takes part in
    async fn conversation_for(
        &self,
        viewer: &str,
        conversation_id: &str,
    ) -> Result<Conversation, AppError> {
        let conversation = self
            .db
            .get_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if !conversation.is_participant(viewer) {
            return Err(AppError::Forbidden);
        }
        Ok(conversation)
    }

    /// Latest messages, oldest first
    pub async fn history(
        &self,
        viewer: &str,
        conversation_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ChatMessage>, AppError> {
        self.conversation_for(viewer, conversation_id).await?;
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        self.db.get_chat_messages(conversation_id, limit).await
    }

    /// Send a message
    ///
    /// # Side Effects
    /// - Updates the last-message summary
    /// - Increments every other participant's unread counter
    /// - Publishes `ChatEvent::Message` to live subscribers
    pub async fn send_message(
        &self,
        sender: &Session,
        conversation_id: &str,
        content: &str,
    ) -> Result<ChatMessage, AppError> {
        let content = sanitize_content(content, MAX_MESSAGE_CHARS)?;
        self.conversation_for(&sender.user_id, conversation_id)
            .await?;

        remember_author(&self.db, sender).await?;
        let message = self
            .db
            .insert_chat_message(conversation_id, &sender.user_id, &content)
            .await?;

        let delivered = self.events.publish(
            conversation_id,
            ChatEvent::Message {
                message: message.clone(),
            },
        );
        tracing::debug!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            delivered,
            "Chat message sent"
        );

        Ok(message)
    }

    /// Reset the viewer's unread counter
    pub async fn mark_read(&self, viewer: &str, conversation_id: &str) -> Result<(), AppError> {
        if !self.db.mark_conversation_read(conversation_id, viewer).await? {
            return match self.db.get_conversation(conversation_id).await? {
                Some(_) => Err(AppError::Forbidden),
                None => Err(AppError::NotFound),
            };
        }

        self.events.publish(
            conversation_id,
            ChatEvent::Read {
                conversation_id: conversation_id.to_string(),
                user_id: viewer.to_string(),
            },
        );
        Ok(())
    }

    /// Flag the trade as completed
    pub async fn complete(
        &self,
        viewer: &str,
        conversation_id: &str,
    ) -> Result<Conversation, AppError> {
        self.conversation_for(viewer, conversation_id).await?;
        self.db.mark_conversation_completed(conversation_id).await?;

        self.events.publish(
            conversation_id,
            ChatEvent::Completed {
                conversation_id: conversation_id.to_string(),
            },
        );

        self.db
            .get_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Subscribe the viewer to live events of a conversation
    pub async fn subscribe(
        &self,
        viewer: &str,
        conversation_id: &str,
    ) -> Result<ChatSubscription, AppError> {
        self.conversation_for(viewer, conversation_id).await?;
        Ok(self.events.subscribe(conversation_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatConfig;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn session(user_id: &str, role: &str) -> Session {
        Session {
            user_id: user_id.to_string(),
            username: format!("{}_name", user_id),
            role: role.to_string(),
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    async fn create_service() -> (ChatService, Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            Database::connect(&temp_dir.path().join("chat.db"))
                .await
                .unwrap(),
        );
        let events = Arc::new(ChatEventRegistry::new(&ChatConfig::default()));
        (ChatService::new(db.clone(), events), db, temp_dir)
    }

    #[tokio::test]
    async fn send_publishes_to_subscribers() {
        let (service, _db, _temp_dir) = create_service().await;
        let buyer = session("buyer", "user");
        let conversation = service
            .open(&buyer, vec!["seller".to_string()], false)
            .await
            .unwrap();

        let mut subscription = service.subscribe("seller", &conversation.id).await.unwrap();
        service
            .send_message(&buyer, &conversation.id, "still available?")
            .await
            .unwrap();

        match subscription.recv().await {
            Some(ChatEvent::Message { message }) => {
                assert_eq!(message.content, "still available?");
                assert_eq!(message.sender_id, "buyer");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn outsiders_cannot_read_or_write() {
        let (service, _db, _temp_dir) = create_service().await;
        let buyer = session("buyer", "user");
        let conversation = service
            .open(&buyer, vec!["seller".to_string()], false)
            .await
            .unwrap();

        let intruder = session("intruder", "user");
        assert!(matches!(
            service.send_message(&intruder, &conversation.id, "hi").await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            service.mark_read("intruder", &conversation.id).await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            service.mark_read("intruder", "missing").await,
            Err(AppError::NotFound)
        ));
        assert!(service.subscribe("intruder", &conversation.id).await.is_err());
    }

    #[tokio::test]
    async fn mark_read_resets_counter() {
        let (service, db, _temp_dir) = create_service().await;
        let buyer = session("buyer", "user");
        let conversation = service
            .open(&buyer, vec!["seller".to_string()], false)
            .await
            .unwrap();
        service
            .send_message(&buyer, &conversation.id, "one")
            .await
            .unwrap();
        service
            .send_message(&buyer, &conversation.id, "two")
            .await
            .unwrap();

        let loaded = db.get_conversation(&conversation.id).await.unwrap().unwrap();
        assert_eq!(loaded.unread_for("seller"), 2);

        service.mark_read("seller", &conversation.id).await.unwrap();
        let loaded = db.get_conversation(&conversation.id).await.unwrap().unwrap();
        assert_eq!(loaded.unread_for("seller"), 0);
    }

    #[tokio::test]
    async fn admin_chat_requires_admin_participant() {
        let (service, db, _temp_dir) = create_service().await;
        let user = session("u1", "user");

        assert!(matches!(
            service.open(&user, vec!["u2".to_string()], true).await,
            Err(AppError::Validation(_))
        ));

        remember_author(&db, &session("mod", ADMIN_ROLE)).await.unwrap();
        let conversation = service
            .open(&user, vec!["mod".to_string()], true)
            .await
            .unwrap();
        assert!(conversation.is_admin_chat);
    }

    #[tokio::test]
    async fn complete_marks_conversation() {
        let (service, _db, _temp_dir) = create_service().await;
        let buyer = session("buyer", "user");
        let conversation = service
            .open(&buyer, vec!["seller".to_string()], false)
            .await
            .unwrap();

        let completed = service.complete("seller", &conversation.id).await.unwrap();
        assert!(completed.is_completed);
    }
}
