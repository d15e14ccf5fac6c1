//! User store.
//!
//! The authentication flow only needs four things from user management:
//! look up by email, look up by id, create, and resolve a role by code.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sqlx::PgPool;
use tracing::warn;

use crate::db::{self, StoreError};
use crate::models::auth::{NewUser, Role, RoleCode, User, UserWithPassword};
use crate::uuid::{parse_id, uuidv7};

/// Persistence contract for users and roles.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserWithPassword>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// Insert a user. A taken email is [`StoreError::Conflict`].
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;

    async fn find_role_by_code(&self, code: RoleCode) -> Result<Option<Role>, StoreError>;
}

type UserRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    bool,
    bool,
    DateTime<Utc>,
    DateTime<Utc>,
);

type RoleRow = (String, String, bool);

const USER_COLUMNS: &str = "id::text, email, name, profile_pic_url, password_hash, verified, status, created_at, updated_at";

fn role_from_row((id, code, status): RoleRow) -> Option<Role> {
    match code.parse::<RoleCode>() {
        Ok(code) => Some(Role { id, code, status }),
        Err(e) => {
            warn!(role_id = %id, "skipping role: {e}");
            None
        }
    }
}

fn user_from_row(row: UserRow, roles: Vec<Role>) -> UserWithPassword {
    let (
        id,
        email,
        name,
        profile_pic_url,
        password_hash,
        verified,
        status,
        created_at,
        updated_at,
    ) = row;
    UserWithPassword {
        user: User {
            id,
            email,
            name,
            profile_pic_url,
            roles,
            verified,
            status,
            created_at,
            updated_at,
        },
        password_hash,
    }
}

/// Users backed by the `users`, `roles` and `user_roles` tables.
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgUserStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn roles_of(&self, user_id: &str) -> Result<Vec<Role>, StoreError> {
        let rows = db::bounded(
            self.timeout,
            sqlx::query_as::<_, RoleRow>(
                "SELECT r.id::text, r.code, r.status \
                 FROM roles r JOIN user_roles ur ON ur.role_id = r.id \
                 WHERE ur.user_id = $1::uuid \
                 ORDER BY r.code",
            )
            .bind(user_id)
            .fetch_all(&self.pool),
        )
        .await?;
        Ok(rows.into_iter().filter_map(role_from_row).collect())
    }

    async fn find_one(
        &self,
        filter: &'static str,
        value: &str,
    ) -> Result<Option<UserWithPassword>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {filter}");
        let row = db::bounded(
            self.timeout,
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(value)
                .fetch_optional(&self.pool),
        )
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let roles = self.roles_of(&row.0).await?;
        Ok(Some(user_from_row(row, roles)))
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserWithPassword>, StoreError> {
        self.find_one("email = $1", email).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        if parse_id(id).is_none() {
            return Ok(None);
        }
        Ok(self
            .find_one("id = $1::uuid", id)
            .await?
            .map(|found| found.user))
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let insert = async {
            let mut tx = self.pool.begin().await?;
            let row = sqlx::query_as::<_, UserRow>(&format!(
                "INSERT INTO users (id, email, name, profile_pic_url, password_hash) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
            ))
            .bind(uuidv7())
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.profile_pic_url)
            .bind(&user.password_hash)
            .fetch_one(&mut *tx)
            .await?;
            for role in &user.roles {
                sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1::uuid, $2::uuid)")
                    .bind(&row.0)
                    .bind(&role.id)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            Ok::<_, sqlx::Error>(row)
        };
        let row = db::bounded(self.timeout, insert).await?;
        Ok(user_from_row(row, user.roles).user)
    }

    async fn find_role_by_code(&self, code: RoleCode) -> Result<Option<Role>, StoreError> {
        let row = db::bounded(
            self.timeout,
            sqlx::query_as::<_, RoleRow>(
                "SELECT id::text, code, status FROM roles WHERE code = $1 AND status",
            )
            .bind(code.as_str())
            .fetch_optional(&self.pool),
        )
        .await?;
        Ok(row.and_then(role_from_row))
    }
}

/// In-process user store, seeded with every [`RoleCode`].
#[derive(Debug)]
pub struct MemoryUserStore {
    users: DashMap<String, UserWithPassword>,
    /// email -> user id
    emails: DashMap<String, String>,
    roles: Vec<Role>,
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::with_roles(
            RoleCode::all()
                .into_iter()
                .map(|code| Role {
                    id: uuidv7().to_string(),
                    code,
                    status: true,
                })
                .collect(),
        )
    }
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roles(roles: Vec<Role>) -> Self {
        Self {
            users: DashMap::new(),
            emails: DashMap::new(),
            roles,
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserWithPassword>, StoreError> {
        let Some(id) = self.emails.get(email).map(|id| id.value().clone()) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(id).map(|u| u.user.clone()))
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let id = uuidv7().to_string();
        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::Conflict(format!(
                    "email '{}' already registered",
                    user.email
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(id.clone());
            }
        }
        let now = Utc::now();
        let created = User {
            id: id.clone(),
            email: user.email,
            name: user.name,
            profile_pic_url: user.profile_pic_url,
            roles: user.roles,
            verified: false,
            status: true,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(
            id,
            UserWithPassword {
                user: created.clone(),
                password_hash: Some(user.password_hash),
            },
        );
        Ok(created)
    }

    async fn find_role_by_code(&self, code: RoleCode) -> Result<Option<Role>, StoreError> {
        Ok(self
            .roles
            .iter()
            .find(|r| r.code == code && r.status)
            .cloned())
    }
}
