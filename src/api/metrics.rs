//! Prometheus metrics endpoint

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, TextEncoder};

use crate::AppState;
use crate::auth::require_auth;
use crate::metrics::{CHAT_CHANNELS_ACTIVE, REGISTRY, VIEW_CACHE_SIZE};

/// GET /metrics
///
/// Gauges for volatile state are resynced from `AppState` before encoding.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    VIEW_CACHE_SIZE.set(state.views.len().await as i64);
    CHAT_CHANNELS_ACTIVE.set(state.chat_events.channel_count() as i64);

    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&REGISTRY.gather()) {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type())],
            text,
        )
            .into_response(),
        Err(error) => {
            tracing::error!(%error, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

/// `/metrics` behind session authentication
pub fn metrics_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}
