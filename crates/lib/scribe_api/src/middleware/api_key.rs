//! `x-api-key` gate applied in front of every route.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use scribe_core::models::auth::Permission;
use tracing::debug;

use crate::AppState;
use crate::error::AppError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Admits the request only when it carries an active key with the
/// `GENERAL` permission.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            AppError::Unauthorized("permission denied: missing x-api-key header".into())
        })?;

    let api_key = state
        .api_keys
        .find_active(key)
        .await?
        .ok_or_else(|| AppError::Forbidden("permission denied: invalid x-api-key".into()))?;

    if !api_key.permissions.contains(&Permission::General) {
        debug!(api_key_id = %api_key.id, "api key lacks GENERAL permission");
        return Err(AppError::Forbidden("permission denied".into()));
    }

    Ok(next.run(request).await)
}
