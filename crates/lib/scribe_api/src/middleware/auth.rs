//! Authentication middleware: Bearer token extraction, JWT verification
//! and keystore lookup.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use scribe_core::auth::service::Session;

use crate::AppState;
use crate::error::AppError;

/// Request extension carrying the authenticated session.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Session);

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".into()))
}

/// Axum middleware: verifies the access token, requires an active keystore
/// record for it, and injects [`AuthenticatedUser`] into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())?;
    let session = state.auth.authenticate(token).await?;

    request.extensions_mut().insert(AuthenticatedUser(session));

    Ok(next.run(request).await)
}
