//! Authentication middleware and extractors
//!
//! The bearer token wins over the `session` cookie when both are sent.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderMap, Request, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use super::session::{Session, verify_session_token};
use crate::AppState;
use crate::error::AppError;

fn session_from_headers(headers: &HeaderMap, state: &AppState) -> Result<Session, AppError> {
    let token = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(ToOwned::to_owned)
        .or_else(|| {
            CookieJar::from_headers(headers)
                .get("session")
                .map(|cookie| cookie.value().to_owned())
        })
        .ok_or(AppError::Unauthorized)?;

    verify_session_token(&token, &state.config.auth.session_secret)
}

/// Route layer rejecting unauthenticated requests
///
/// The verified `Session` is stored in request extensions so that
/// `CurrentUser` does not verify the token twice.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let session = session_from_headers(request.headers(), &state)?;
    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}

/// The authenticated viewer
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Session);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<Session>().cloned() {
            return Ok(CurrentUser(session));
        }

        let state = AppState::from_ref(state);
        let session = session_from_headers(&parts.headers, &state)?;
        parts.extensions.insert(session.clone());

        Ok(CurrentUser(session))
    }
}

/// Authenticated viewer holding the admin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub Session);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(session) = CurrentUser::from_request_parts(parts, state).await?;
        if !session.is_admin() {
            tracing::warn!(user_id = %session.user_id, "Non-admin attempted admin action");
            return Err(AppError::Forbidden);
        }
        Ok(AdminUser(session))
    }
}
