//! Post and comment endpoints

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::Json,
};

use super::dto::{CreateCommentRequest, CreatePostRequest};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::{Comment, Post, session_fingerprint};
use crate::error::AppError;

/// POST /api/v1/posts
pub async fn create_post(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Json(req): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    let post = state.posts.create(&session, &req.content).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /api/v1/posts/mine
pub async fn my_posts(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<Vec<Post>>, AppError> {
    let posts = state.posts.own_posts(&session.user_id).await?;
    Ok(Json(posts))
}

/// GET /api/v1/posts/:id
///
/// Public. Counts at most one view per client fingerprint and window.
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Result<Json<Post>, AppError> {
    let ip = client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    let post = state
        .posts
        .view(&id, &session_fingerprint(&ip, user_agent))
        .await?;
    Ok(Json(post))
}

/// Client address, preferring proxy headers over the socket peer
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("X-Forwarded-For")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("X-Real-IP")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// POST /api/v1/posts/:id/comments
pub async fn add_comment(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let comment = state.posts.add_comment(&session, &id, &req.text).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// DELETE /api/v1/posts/:id/comments/:comment_id
pub async fn delete_comment(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path((id, comment_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state
        .posts
        .remove_comment(&session, &id, &comment_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/posts/:id/comments/read
pub async fn mark_comments_read(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.posts.mark_comments_read(&session.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
