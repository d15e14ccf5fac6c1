//! Request handlers.

pub mod auth;
pub mod profile;

use crate::error::AppError;

/// Fallback for paths no route matches.
pub async fn not_found_handler() -> AppError {
    AppError::NotFound("Route not found".into())
}
