//! Profile handlers.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use scribe_core::uuid::parse_id;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{PrivateUser, PublicUser};

/// `GET /profile/mine`
pub async fn my_profile_handler(
    Extension(AuthenticatedUser(session)): Extension<AuthenticatedUser>,
) -> Json<PrivateUser> {
    Json(PrivateUser::from(&session.user))
}

/// `GET /profile/id/{id}`
pub async fn public_profile_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PublicUser>> {
    let id = parse_id(&id).ok_or_else(|| AppError::Validation("invalid user id".into()))?;
    let user = state
        .users
        .find_by_id(&id.to_string())
        .await?
        .filter(|u| u.status)
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(PublicUser::from(&user)))
}
