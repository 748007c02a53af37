//! Notification endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

use super::dto::FeedParams;
use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::AdminNotificationList;
use crate::error::AppError;
use crate::service::{AggregatedFeed, AggregatorConfig, aggregate};

/// GET /api/v1/notifications
///
/// Admin notifications of the caller plus unread count.
pub async fn list_notifications(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<AdminNotificationList>, AppError> {
    let list = state.notices.list_for(&session.user_id).await?;
    Ok(Json(list))
}

/// POST /api/v1/notifications/:id/read
pub async fn mark_notification_read(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.notices.mark_read(&session.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/notifications/feed
///
/// Aggregated feed computed on the server. Source failures degrade the
/// feed instead of failing the request.
pub async fn notification_feed(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Query(params): Query<FeedParams>,
) -> Json<AggregatedFeed> {
    let config = AggregatorConfig::from(&state.config.notifications);
    let feed = aggregate(
        state.sources.as_ref(),
        &session.user_id,
        params.cleared_at.unwrap_or_default(),
        &config,
    )
    .await;
    Json(feed)
}
