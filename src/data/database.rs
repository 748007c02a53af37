//! SQLite database operations
//!
//! All database access goes through this module.
//! Uses SQLx with embedded migrations.

use chrono::{DateTime, Utc};
use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::models::*;
use crate::error::AppError;

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: String,
    is_admin_chat: bool,
    is_completed: bool,
    last_message_content: Option<String>,
    last_message_sender: Option<String>,
    last_message_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConversationRow {
    fn into_conversation(self, participants: Vec<ConversationParticipant>) -> Conversation {
        let last_message = match (
            self.last_message_content,
            self.last_message_sender,
            self.last_message_at,
        ) {
            (Some(content), Some(sender_id), Some(created_at)) => Some(LastMessage {
                content,
                sender_id,
                created_at,
            }),
            _ => None,
        };

        Conversation {
            id: self.id,
            participants,
            last_message,
            is_admin_chat: self.is_admin_chat,
            is_completed: self.is_completed,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ParticipantRow {
    conversation_id: String,
    user_id: String,
    username: Option<String>,
    unread_count: i64,
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: String,
    owner_id: String,
    content: String,
    view_count: i64,
    comments_read_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl PostRow {
    fn into_post(self, comments: Vec<Comment>) -> Post {
        Post {
            id: self.id,
            owner_id: self.owner_id,
            content: self.content,
            view_count: self.view_count,
            comments_read_at: self.comments_read_at,
            created_at: self.created_at,
            comments,
        }
    }
}

const CONVERSATION_COLUMNS: &str = "c.id, c.is_admin_chat, c.is_completed, c.last_message_content, \
     c.last_message_sender, c.last_message_at, c.created_at, c.updated_at";

/// Participant ids in first-seen order, duplicates removed
fn dedup_participants(participant_ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    participant_ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty() && seen.insert(id.to_string()))
        .map(ToOwned::to_owned)
        .collect()
}

/// Order-independent key identifying a participant set
fn participant_key(participants: &[String]) -> String {
    let mut sorted = participants.to_vec();
    sorted.sort();
    sorted.join(",")
}

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert or refresh a user record
    pub async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, role, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                role = excluded.role
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.role)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ? LIMIT 1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    /// Get the conversation for a participant set, creating it if needed
    ///
    /// Participant order is preserved from the first creation; the same set
    /// in any order resolves to the same conversation.
    pub async fn get_or_create_conversation(
        &self,
        participant_ids: &[String],
        is_admin_chat: bool,
    ) -> Result<Conversation, AppError> {
        let participants = dedup_participants(participant_ids);
        if participants.len() < 2 {
            return Err(AppError::Validation(
                "a conversation needs at least two participants".to_string(),
            ));
        }

        let key = participant_key(&participants);
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO conversations (id, participant_key, is_admin_chat, is_completed, created_at, updated_at)
            VALUES (?, ?, ?, 0, ?, ?)
            ON CONFLICT(participant_key) DO NOTHING
            "#,
        )
        .bind(EntityId::new().0)
        .bind(&key)
        .bind(is_admin_chat)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let (conversation_id, stored_admin_chat): (String, bool) =
            sqlx::query_as("SELECT id, is_admin_chat FROM conversations WHERE participant_key = ?")
                .bind(&key)
                .fetch_one(&mut *tx)
                .await?;
        if stored_admin_chat != is_admin_chat {
            return Err(AppError::Validation(format!(
                "conversation {} already exists with is_admin_chat = {}",
                conversation_id, stored_admin_chat
            )));
        }

        for (position, user_id) in participants.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id, position, unread_count)
                VALUES (?, ?, ?, 0)
                "#,
            )
            .bind(&conversation_id)
            .bind(user_id)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.get_conversation(&conversation_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn load_participants(
        &self,
        conversation_ids: &[String],
    ) -> Result<HashMap<String, Vec<ConversationParticipant>>, AppError> {
        let mut by_conversation: HashMap<String, Vec<ConversationParticipant>> = HashMap::new();
        if conversation_ids.is_empty() {
            return Ok(by_conversation);
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT p.conversation_id, p.user_id, u.username, p.unread_count \
             FROM conversation_participants p LEFT JOIN users u ON u.id = p.user_id \
             WHERE p.conversation_id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in conversation_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(") ORDER BY p.conversation_id, p.position");

        let rows = builder
            .build_query_as::<ParticipantRow>()
            .fetch_all(&self.pool)
            .await?;

        for row in rows {
            by_conversation
                .entry(row.conversation_id)
                .or_default()
                .push(ConversationParticipant {
                    user_id: row.user_id,
                    username: row.username,
                    unread_count: row.unread_count,
                });
        }

        Ok(by_conversation)
    }

    async fn hydrate_conversations(
        &self,
        rows: Vec<ConversationRow>,
    ) -> Result<Vec<Conversation>, AppError> {
        let ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
        let mut participants = self.load_participants(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let members = participants.remove(&row.id).unwrap_or_default();
                row.into_conversation(members)
            })
            .collect())
    }

    /// Get a conversation by ID
    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, AppError> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations c WHERE c.id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(self.hydrate_conversations(vec![row]).await?.pop())
    }

    /// Get every conversation a user participates in, most recently active first
    pub async fn get_conversations_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Conversation>, AppError> {
        let rows = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations c \
             JOIN conversation_participants p ON p.conversation_id = c.id \
             WHERE p.user_id = ?"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut conversations = self.hydrate_conversations(rows).await?;
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(conversations)
    }

    /// Store a chat message
    ///
    /// In one transaction: updates the last-message summary and increments
    /// the unread counter of every participant except the sender.
    pub async fn insert_chat_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<ChatMessage, AppError> {
        let message = ChatMessage {
            id: EntityId::new().0,
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE conversations
            SET last_message_content = ?, last_message_sender = ?, last_message_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&message.content)
        .bind(&message.sender_id)
        .bind(message.created_at)
        .bind(message.created_at)
        .bind(conversation_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }

        sqlx::query(
            "INSERT INTO chat_messages (id, conversation_id, sender_id, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(&message.sender_id)
        .bind(&message.content)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE conversation_participants SET unread_count = unread_count + 1 WHERE conversation_id = ? AND user_id != ?",
        )
        .bind(conversation_id)
        .bind(sender_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(message)
    }

    /// Get the most recent chat messages of a conversation, oldest first
    pub async fn get_chat_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, AppError> {
        let mut messages = sqlx::query_as::<_, ChatMessage>(
            "SELECT id, conversation_id, sender_id, content, created_at FROM chat_messages \
             WHERE conversation_id = ? ORDER BY rowid DESC LIMIT ?",
        )
        .bind(conversation_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        messages.reverse();
        Ok(messages)
    }

    /// Reset one participant's unread counter
    ///
    /// # Returns
    /// false if the user is not a participant of the conversation
    pub async fn mark_conversation_read(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE conversation_participants SET unread_count = 0 WHERE conversation_id = ? AND user_id = ?",
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Flag the trade negotiated in this conversation as done
    pub async fn mark_conversation_completed(&self, conversation_id: &str) -> Result<bool, AppError> {
        let result =
            sqlx::query("UPDATE conversations SET is_completed = 1, updated_at = ? WHERE id = ?")
                .bind(Utc::now())
                .bind(conversation_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Posts and comments
    // =========================================================================

    /// Create a wanted post
    pub async fn insert_post(&self, owner_id: &str, content: &str) -> Result<Post, AppError> {
        let now = Utc::now();
        let post = Post {
            id: EntityId::new().0,
            owner_id: owner_id.to_string(),
            content: content.to_string(),
            view_count: 0,
            comments_read_at: now,
            created_at: now,
            comments: Vec::new(),
        };

        sqlx::query(
            "INSERT INTO posts (id, owner_id, content, view_count, comments_read_at, created_at) VALUES (?, ?, ?, 0, ?, ?)",
        )
        .bind(&post.id)
        .bind(&post.owner_id)
        .bind(&post.content)
        .bind(post.comments_read_at)
        .bind(post.created_at)
        .execute(&self.pool)
        .await?;

        Ok(post)
    }

    async fn load_comments(
        &self,
        post_ids: &[String],
    ) -> Result<HashMap<String, Vec<Comment>>, AppError> {
        let mut by_post: HashMap<String, Vec<Comment>> = HashMap::new();
        if post_ids.is_empty() {
            return Ok(by_post);
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, post_id, author_id, text, created_at FROM post_comments WHERE post_id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in post_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(") ORDER BY rowid");

        let comments = builder
            .build_query_as::<Comment>()
            .fetch_all(&self.pool)
            .await?;

        for comment in comments {
            by_post
                .entry(comment.post_id.clone())
                .or_default()
                .push(comment);
        }

        Ok(by_post)
    }

    async fn hydrate_posts(&self, rows: Vec<PostRow>) -> Result<Vec<Post>, AppError> {
        let ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
        let mut comments = self.load_comments(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let thread = comments.remove(&row.id).unwrap_or_default();
                row.into_post(thread)
            })
            .collect())
    }

    /// Get a post with its comments
    pub async fn get_post(&self, id: &str) -> Result<Option<Post>, AppError> {
        let row = sqlx::query_as::<_, PostRow>(
            "SELECT id, owner_id, content, view_count, comments_read_at, created_at FROM posts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(self.hydrate_posts(vec![row]).await?.pop())
    }

    /// Get all posts of one owner, newest first, with comments
    pub async fn get_posts_by_owner(&self, owner_id: &str) -> Result<Vec<Post>, AppError> {
        let rows = sqlx::query_as::<_, PostRow>(
            "SELECT id, owner_id, content, view_count, comments_read_at, created_at FROM posts \
             WHERE owner_id = ? ORDER BY rowid DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate_posts(rows).await
    }

    /// Increment the persisted view counter
    pub async fn increment_post_views(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE posts SET view_count = view_count + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Append a comment to a post
    pub async fn insert_comment(
        &self,
        post_id: &str,
        author_id: &str,
        text: &str,
    ) -> Result<Comment, AppError> {
        let comment = Comment {
            id: EntityId::new().0,
            post_id: post_id.to_string(),
            author_id: author_id.to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO post_comments (id, post_id, author_id, text, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&comment.id)
        .bind(&comment.post_id)
        .bind(&comment.author_id)
        .bind(&comment.text)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(comment)
    }

    pub async fn get_comment(
        &self,
        post_id: &str,
        comment_id: &str,
    ) -> Result<Option<Comment>, AppError> {
        let comment = sqlx::query_as::<_, Comment>(
            "SELECT id, post_id, author_id, text, created_at FROM post_comments WHERE post_id = ? AND id = ?",
        )
        .bind(post_id)
        .bind(comment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(comment)
    }

    pub async fn delete_comment(&self, post_id: &str, comment_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM post_comments WHERE post_id = ? AND id = ?")
            .bind(post_id)
            .bind(comment_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Move the owner's comment read cursor
    pub async fn mark_post_comments_read(
        &self,
        post_id: &str,
        read_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE posts SET comments_read_at = ? WHERE id = ?")
            .bind(read_at)
            .bind(post_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Admin notifications
    // =========================================================================

    pub async fn insert_admin_notification(
        &self,
        notification: &AdminNotification,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO admin_notifications (id, user_id, title, body, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&notification.id)
        .bind(&notification.user_id)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(&notification.status)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a user's admin notifications, newest first
    pub async fn get_admin_notifications(
        &self,
        user_id: &str,
    ) -> Result<Vec<AdminNotification>, AppError> {
        let notifications = sqlx::query_as::<_, AdminNotification>(
            "SELECT * FROM admin_notifications WHERE user_id = ? ORDER BY rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }

    pub async fn get_admin_notification(
        &self,
        id: &str,
    ) -> Result<Option<AdminNotification>, AppError> {
        let notification =
            sqlx::query_as::<_, AdminNotification>("SELECT * FROM admin_notifications WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(notification)
    }

    pub async fn mark_admin_notification_read(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE admin_notifications SET status = ? WHERE id = ?")
            .bind(NotificationStatus::Read.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
