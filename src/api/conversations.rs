//! Conversation endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

use super::dto::{HistoryParams, OpenConversationRequest, SendMessageRequest};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::{ChatMessage, Conversation};
use crate::error::AppError;

/// GET /api/v1/conversations
///
/// Conversations of the caller with per-participant unread counters.
pub async fn list_conversations(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<Vec<Conversation>>, AppError> {
    let conversations = state.chat.conversations(&session.user_id).await?;
    Ok(Json(conversations))
}

/// POST /api/v1/conversations
///
/// Returns the existing conversation for the same participant set if any.
pub async fn open_conversation(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Json(req): Json<OpenConversationRequest>,
) -> Result<Json<Conversation>, AppError> {
    let conversation = state
        .chat
        .open(&session, req.participant_ids, req.is_admin_chat)
        .await?;
    Ok(Json(conversation))
}

/// GET /api/v1/conversations/:id/messages
pub async fn list_messages(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    let messages = state
        .chat
        .history(&session.user_id, &id, params.limit)
        .await?;
    Ok(Json(messages))
}

/// POST /api/v1/conversations/:id/messages
pub async fn send_message(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessage>), AppError> {
    let message = state.chat.send_message(&session, &id, &req.content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /api/v1/conversations/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.chat.mark_read(&session.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/conversations/:id/complete
pub async fn complete(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, AppError> {
    let conversation = state.chat.complete(&session.user_id, &id).await?;
    Ok(Json(conversation))
}
