//! Client API keys.
//!
//! Every request carries an `x-api-key` header; only keys with an active
//! record are admitted.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::PgPool;
use tracing::warn;

use crate::db::{self, StoreError};
use crate::models::auth::{ApiKey, Permission};
use crate::uuid::uuidv7;

/// Persistence contract for API keys.
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// Active key record matching `key` exactly.
    async fn find_active(&self, key: &str) -> Result<Option<ApiKey>, StoreError>;

    /// Register a new active key.
    async fn create(
        &self,
        key: &str,
        version: i32,
        permissions: &[Permission],
        comments: &[String],
    ) -> Result<ApiKey, StoreError>;
}

type ApiKeyRow = (
    String,
    String,
    i32,
    Vec<String>,
    Vec<String>,
    bool,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn from_row(row: ApiKeyRow) -> ApiKey {
    let (id, key, version, permissions, comments, status, created_at, updated_at) = row;
    let permissions = permissions
        .iter()
        .filter_map(|p| match p.parse::<Permission>() {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(api_key_id = %id, "ignoring stored permission: {e}");
                None
            }
        })
        .collect();
    ApiKey {
        id,
        key,
        version,
        permissions,
        comments,
        status,
        created_at,
        updated_at,
    }
}

/// API keys backed by the `api_keys` table.
#[derive(Debug, Clone)]
pub struct PgApiKeyStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgApiKeyStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl ApiKeyStore for PgApiKeyStore {
    async fn find_active(&self, key: &str) -> Result<Option<ApiKey>, StoreError> {
        let row = db::bounded(
            self.timeout,
            sqlx::query_as::<_, ApiKeyRow>(
                "SELECT id::text, key, version, permissions, comments, status, created_at, updated_at \
                 FROM api_keys WHERE key = $1 AND status",
            )
            .bind(key)
            .fetch_optional(&self.pool),
        )
        .await?;
        Ok(row.map(from_row))
    }

    async fn create(
        &self,
        key: &str,
        version: i32,
        permissions: &[Permission],
        comments: &[String],
    ) -> Result<ApiKey, StoreError> {
        let permissions: Vec<String> = permissions.iter().map(|p| p.as_str().to_string()).collect();
        let row = db::bounded(
            self.timeout,
            sqlx::query_as::<_, ApiKeyRow>(
                "INSERT INTO api_keys (id, key, version, permissions, comments) \
                 VALUES ($1, $2, $3, $4, $5) \
                 RETURNING id::text, key, version, permissions, comments, status, created_at, updated_at",
            )
            .bind(uuidv7())
            .bind(key)
            .bind(version)
            .bind(&permissions)
            .bind(comments)
            .fetch_one(&self.pool),
        )
        .await?;
        Ok(from_row(row))
    }
}

/// In-process API key store.
#[derive(Debug, Default)]
pub struct MemoryApiKeyStore {
    keys: DashMap<String, ApiKey>,
}

impl MemoryApiKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip a key's status, e.g. to simulate revocation.
    pub fn set_status(&self, key: &str, status: bool) {
        if let Some(mut stored) = self.keys.get_mut(key) {
            stored.status = status;
            stored.updated_at = Utc::now();
        }
    }
}

#[async_trait]
impl ApiKeyStore for MemoryApiKeyStore {
    async fn find_active(&self, key: &str) -> Result<Option<ApiKey>, StoreError> {
        Ok(self
            .keys
            .get(key)
            .filter(|k| k.status)
            .map(|k| k.value().clone()))
    }

    async fn create(
        &self,
        key: &str,
        version: i32,
        permissions: &[Permission],
        comments: &[String],
    ) -> Result<ApiKey, StoreError> {
        if self.keys.contains_key(key) {
            return Err(StoreError::Conflict("api key already exists".into()));
        }
        let now = Utc::now();
        let record = ApiKey {
            id: uuidv7().to_string(),
            key: key.to_string(),
            version,
            permissions: permissions.to_vec(),
            comments: comments.to_vec(),
            status: true,
            created_at: now,
            updated_at: now,
        };
        self.keys.insert(key.to_string(), record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn active_key_is_found() {
        let store = MemoryApiKeyStore::new();
        store
            .create("key-1", 1, &[Permission::General], &["web client".into()])
            .await
            .unwrap();

        let found = store.find_active("key-1").await.unwrap().expect("key");
        assert_eq!(found.permissions, vec![Permission::General]);
        assert!(store.find_active("key-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn inactive_key_is_hidden() {
        let store = MemoryApiKeyStore::new();
        store.create("key-1", 1, &[Permission::General], &[]).await.unwrap();
        store.set_status("key-1", false);
        assert!(store.find_active("key-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_key_conflicts() {
        let store = MemoryApiKeyStore::new();
        store.create("key-1", 1, &[], &[]).await.unwrap();
        let err = store.create("key-1", 2, &[], &[]).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
