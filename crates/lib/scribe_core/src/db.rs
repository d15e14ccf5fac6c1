//! PostgreSQL connection management.
//!
//! Provides pool construction and [`bounded`], the uniform per-call timeout
//! every store applies to its queries.

use std::future::Future;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;
use tracing::info;

/// Default upper bound for a single storage call.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time to wait for a free pooled connection.
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors surfaced by the storage collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQL error: {0}")]
    Sql(sqlx::Error),

    #[error("Storage call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unique constraint violated: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e
            && db.is_unique_violation()
        {
            return StoreError::Conflict(db.message().to_string());
        }
        StoreError::Sql(e)
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Connection settings for the application database.
#[derive(Debug, Clone)]
pub struct DbSettings {
    /// PostgreSQL connection URL.
    pub url: String,
    /// Maximum number of pooled connections.
    pub max_connections: u32,
    /// Per-call timeout applied by the stores.
    pub query_timeout: Duration,
}

impl DbSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 5,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

/// Open a connection pool to the application database.
pub async fn connect(settings: &DbSettings) -> Result<PgPool> {
    info!(
        max_connections = settings.max_connections,
        "connecting to PostgreSQL"
    );
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(DEFAULT_ACQUIRE_TIMEOUT)
        .connect(&settings.url)
        .await?;
    Ok(pool)
}

/// Run a storage call, failing with [`StoreError::Timeout`] once `limit` elapses.
pub async fn bounded<T, F>(limit: Duration, query: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, query).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
