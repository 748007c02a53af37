//! Streaming API endpoints
//!
//! Live conversation events via Server-Sent Events (SSE)

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::service::ChatEvent;

/// GET /api/v1/conversations/:id/stream
///
/// Participants only. The subscription is released when the client
/// disconnects and the stream is dropped.
pub async fn stream_conversation(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let subscription = state.chat.subscribe(&session.user_id, &id).await?;
    tracing::debug!(conversation_id = %id, user_id = %session.user_id, "Chat stream opened");

    let stream = subscription.into_stream().map(|event| Ok(to_sse_event(&event)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: &ChatEvent) -> Event {
    match Event::default().event(event.name()).json_data(event) {
        Ok(sse_event) => sse_event,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode chat event");
            Event::default().event("error").data("encoding failed")
        }
    }
}
