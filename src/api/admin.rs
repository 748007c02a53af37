//! Admin API endpoints
//!
//! All routes require the admin role.

use axum::{Router, extract::State, http::StatusCode, response::Json, routing::post};

use super::dto::SendNotificationRequest;
use crate::AppState;
use crate::auth::AdminUser;
use crate::data::AdminNotification;
use crate::error::AppError;

/// Create admin router
///
/// Routes:
/// - POST /api/v1/admin/notifications - Send a notification to a user
pub fn admin_router() -> Router<AppState> {
    Router::new().route("/notifications", post(send_notification))
}

/// POST /api/v1/admin/notifications
async fn send_notification(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<SendNotificationRequest>,
) -> Result<(StatusCode, Json<AdminNotification>), AppError> {
    let notification = state
        .notices
        .send(&admin, &req.user_id, &req.title, &req.body)
        .await?;
    Ok((StatusCode::CREATED, Json(notification)))
}
