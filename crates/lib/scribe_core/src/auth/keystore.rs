//! Session keystore.
//!
//! One record per token issuance. A token is only honoured while the record
//! carrying its `jti` is active, so invalidating a record revokes both
//! tokens of the pair at once.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::PgPool;
use tracing::debug;

use crate::db::{self, StoreError};
use crate::models::auth::KeystoreRecord;
use crate::uuid::uuidv7;

/// Persistence contract for keystore records.
#[async_trait]
pub trait KeystoreStore: Send + Sync {
    /// Insert a new active record.
    async fn create(
        &self,
        user_id: &str,
        primary_key: &str,
        secondary_key: &str,
    ) -> Result<KeystoreRecord, StoreError>;

    /// Active record owned by `user_id` whose access-token key is `primary_key`.
    async fn find_active_by_primary_key(
        &self,
        primary_key: &str,
        user_id: &str,
    ) -> Result<Option<KeystoreRecord>, StoreError>;

    /// Active record owned by `user_id` whose refresh-token key is `secondary_key`.
    async fn find_active_by_secondary_key(
        &self,
        secondary_key: &str,
        user_id: &str,
    ) -> Result<Option<KeystoreRecord>, StoreError>;

    /// Mark a record inactive. Invalidating an inactive record is a no-op.
    async fn invalidate(&self, record: &KeystoreRecord) -> Result<(), StoreError>;
}

type KeystoreRow = (
    String,
    String,
    String,
    String,
    bool,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn from_row(row: KeystoreRow) -> KeystoreRecord {
    let (id, user_id, primary_key, secondary_key, status, created_at, updated_at) = row;
    KeystoreRecord {
        id,
        user_id,
        primary_key,
        secondary_key,
        status,
        created_at,
        updated_at,
    }
}

/// Keystore backed by the `keystores` table.
#[derive(Debug, Clone)]
pub struct PgKeystore {
    pool: PgPool,
    timeout: Duration,
}

impl PgKeystore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn find_active(
        &self,
        column: &'static str,
        key: &str,
        user_id: &str,
    ) -> Result<Option<KeystoreRecord>, StoreError> {
        let sql = format!(
            "SELECT id::text, user_id::text, primary_key, secondary_key, status, created_at, updated_at \
             FROM keystores \
             WHERE user_id = $1::uuid AND {column} = $2 AND status"
        );
        let row = db::bounded(
            self.timeout,
            sqlx::query_as::<_, KeystoreRow>(&sql)
                .bind(user_id)
                .bind(key)
                .fetch_optional(&self.pool),
        )
        .await?;
        Ok(row.map(from_row))
    }
}

#[async_trait]
impl KeystoreStore for PgKeystore {
    async fn create(
        &self,
        user_id: &str,
        primary_key: &str,
        secondary_key: &str,
    ) -> Result<KeystoreRecord, StoreError> {
        let row = db::bounded(
            self.timeout,
            sqlx::query_as::<_, KeystoreRow>(
                "INSERT INTO keystores (id, user_id, primary_key, secondary_key) \
                 VALUES ($1, $2::uuid, $3, $4) \
                 RETURNING id::text, user_id::text, primary_key, secondary_key, status, created_at, updated_at",
            )
            .bind(uuidv7())
            .bind(user_id)
            .bind(primary_key)
            .bind(secondary_key)
            .fetch_one(&self.pool),
        )
        .await?;
        Ok(from_row(row))
    }

    async fn find_active_by_primary_key(
        &self,
        primary_key: &str,
        user_id: &str,
    ) -> Result<Option<KeystoreRecord>, StoreError> {
        self.find_active("primary_key", primary_key, user_id).await
    }

    async fn find_active_by_secondary_key(
        &self,
        secondary_key: &str,
        user_id: &str,
    ) -> Result<Option<KeystoreRecord>, StoreError> {
        self.find_active("secondary_key", secondary_key, user_id).await
    }

    async fn invalidate(&self, record: &KeystoreRecord) -> Result<(), StoreError> {
        let result = db::bounded(
            self.timeout,
            sqlx::query(
                "UPDATE keystores SET status = FALSE, updated_at = now() \
                 WHERE id = $1::uuid AND status",
            )
            .bind(&record.id)
            .execute(&self.pool),
        )
        .await?;
        debug!(
            keystore_id = %record.id,
            changed = result.rows_affected(),
            "keystore record invalidated"
        );
        Ok(())
    }
}

/// In-process keystore, for tests and single-node development.
#[derive(Debug, Default)]
pub struct MemoryKeystore {
    records: DashMap<String, KeystoreRecord>,
}

impl MemoryKeystore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently active.
    pub fn active_count(&self) -> usize {
        self.records.iter().filter(|r| r.status).count()
    }

    /// Total records ever created.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn find_active<F>(&self, user_id: &str, matches: F) -> Option<KeystoreRecord>
    where
        F: Fn(&KeystoreRecord) -> bool,
    {
        self.records
            .iter()
            .find(|r| r.status && r.user_id == user_id && matches(r.value()))
            .map(|r| r.value().clone())
    }
}

#[async_trait]
impl KeystoreStore for MemoryKeystore {
    async fn create(
        &self,
        user_id: &str,
        primary_key: &str,
        secondary_key: &str,
    ) -> Result<KeystoreRecord, StoreError> {
        let now = Utc::now();
        let record = KeystoreRecord {
            id: uuidv7().to_string(),
            user_id: user_id.to_string(),
            primary_key: primary_key.to_string(),
            secondary_key: secondary_key.to_string(),
            status: true,
            created_at: now,
            updated_at: now,
        };
        self.records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn find_active_by_primary_key(
        &self,
        primary_key: &str,
        user_id: &str,
    ) -> Result<Option<KeystoreRecord>, StoreError> {
        Ok(self.find_active(user_id, |r| r.primary_key == primary_key))
    }

    async fn find_active_by_secondary_key(
        &self,
        secondary_key: &str,
        user_id: &str,
    ) -> Result<Option<KeystoreRecord>, StoreError> {
        Ok(self.find_active(user_id, |r| r.secondary_key == secondary_key))
    }

    async fn invalidate(&self, record: &KeystoreRecord) -> Result<(), StoreError> {
        if let Some(mut stored) = self.records.get_mut(&record.id)
            && stored.status
        {
            stored.status = false;
            stored.updated_at = Utc::now();
        }
        Ok(())
    }
}
