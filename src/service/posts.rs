//! Post service
//!
//! Wanted posts, their comment threads and deduplicated view counting.

use std::sync::Arc;

use chrono::Utc;

use super::{remember_author, sanitize_content};
use crate::auth::Session;
use crate::data::{Comment, Database, Post, ViewCache, view_key};
use crate::error::AppError;

const MAX_POST_CHARS: usize = 5000;
const MAX_COMMENT_CHARS: usize = 1000;

/// Post service
pub struct PostService {
    db: Arc<Database>,
    views: Arc<ViewCache>,
}

impl PostService {
    /// Create new post service
    pub fn new(db: Arc<Database>, views: Arc<ViewCache>) -> Self {
        Self { db, views }
    }

    /// Publish a new post
    pub async fn create(&self, owner: &Session, content: &str) -> Result<Post, AppError> {
        let content = sanitize_content(content, MAX_POST_CHARS)?;
        remember_author(&self.db, owner).await?;
        let post = self.db.insert_post(&owner.user_id, &content).await?;

        tracing::info!(post_id = %post.id, owner_id = %owner.user_id, "Post created");
        Ok(post)
    }

    /// Posts owned by the viewer, newest first
    pub async fn own_posts(&self, viewer: &str) -> Result<Vec<Post>, AppError> {
        self.db.get_posts_by_owner(viewer).await
    }

    /// Load a post on behalf of a session fingerprint
    ///
    /// The persisted view counter moves at most once per fingerprint and
    /// dedup window.
    pub async fn view(&self, post_id: &str, fingerprint: &str) -> Result<Post, AppError> {
        let mut post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if self.views.record_view(&view_key(fingerprint, post_id)).await
            && self.db.increment_post_views(post_id).await?
        {
            post.view_count += 1;
        }

        Ok(post)
    }

    /// Comment on a post
    pub async fn add_comment(
        &self,
        author: &Session,
        post_id: &str,
        text: &str,
    ) -> Result<Comment, AppError> {
        let text = sanitize_content(text, MAX_COMMENT_CHARS)?;
        if self.db.get_post(post_id).await?.is_none() {
            return Err(AppError::NotFound);
        }

        remember_author(&self.db, author).await?;
        self.db.insert_comment(post_id, &author.user_id, &text).await
    }

    /// Delete a comment (its author, the post owner or an admin)
    pub async fn remove_comment(
        &self,
        actor: &Session,
        post_id: &str,
        comment_id: &str,
    ) -> Result<(), AppError> {
        let comment = self
            .db
            .get_comment(post_id, comment_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let allowed = comment.author_id == actor.user_id
            || post.owner_id == actor.user_id
            || actor.is_admin();
        if !allowed {
            return Err(AppError::Forbidden);
        }

        self.db.delete_comment(post_id, comment_id).await?;
        tracing::info!(post_id = %post_id, comment_id = %comment_id, "Comment deleted");
        Ok(())
    }

    /// Acknowledge every comment currently on the viewer's post
    pub async fn mark_comments_read(&self, viewer: &str, post_id: &str) -> Result<(), AppError> {
        let post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if post.owner_id != viewer {
            return Err(AppError::Forbidden);
        }

        self.db.mark_post_comments_read(post_id, Utc::now()).await?;
        Ok(())
    }
}
