//! HTTP client for the REST API
//!
//! Implements `NotificationSource` over the JSON endpoints so the feed and
//! poller run unchanged on the client side.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::data::{AdminNotificationList, Conversation, Post};
use crate::error::AppError;
use crate::service::{AggregatedFeed, NotificationSource};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Authenticated API client
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl ApiClient {
    /// Create a client for `base_url` with the default 10 second timeout
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, AppError> {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        // Url::join drops the last path segment unless it ends with a slash
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| AppError::Config(format!("invalid API base url: {}", e)))?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("CampusMarket/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::Config(format!("invalid endpoint {}: {}", path, e)))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AppError> {
        let response = self
            .http
            .get(self.endpoint(path)?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn post_empty(&self, path: &str) -> Result<(), AppError> {
        let response = self
            .http
            .post(self.endpoint(path)?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Map non-success statuses onto `AppError`
    async fn check(response: Response) -> Result<Response, AppError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED => Err(AppError::Unauthorized),
            StatusCode::FORBIDDEN => Err(AppError::Forbidden),
            StatusCode::NOT_FOUND => Err(AppError::NotFound),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(AppError::Upstream(format!("{}: {}", status, body)))
            }
        }
    }

    /// Server-side aggregation, for clients that do not aggregate locally
    pub async fn server_feed(&self, cleared_at: DateTime<Utc>) -> Result<AggregatedFeed, AppError> {
        let mut url = self.endpoint("api/v1/notifications/feed")?;
        url.query_pairs_mut()
            .append_pair("cleared_at", &cleared_at.to_rfc3339());

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

impl NotificationSource for ApiClient {
    async fn admin_notifications(&self, _viewer: &str) -> Result<AdminNotificationList, AppError> {
        self.get_json("api/v1/notifications").await
    }

    async fn conversations(&self, _viewer: &str) -> Result<Vec<Conversation>, AppError> {
        self.get_json("api/v1/conversations").await
    }

    async fn own_posts(&self, _viewer: &str) -> Result<Vec<Post>, AppError> {
        self.get_json("api/v1/posts/mine").await
    }

    async fn mark_conversation_read(
        &self,
        _viewer: &str,
        conversation_id: &str,
    ) -> Result<(), AppError> {
        self.post_empty(&format!("api/v1/conversations/{}/read", conversation_id))
            .await
    }

    async fn mark_comments_read(&self, _viewer: &str, post_id: &str) -> Result<(), AppError> {
        self.post_empty(&format!("api/v1/posts/{}/comments/read", post_id))
            .await
    }

    async fn mark_notification_read(
        &self,
        _viewer: &str,
        notification_id: &str,
    ) -> Result<(), AppError> {
        self.post_empty(&format!("api/v1/notifications/{}/read", notification_id))
            .await
    }
}
