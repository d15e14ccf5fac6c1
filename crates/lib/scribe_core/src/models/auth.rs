//! Authentication domain models.
//!
//! These are internal domain models, distinct from the request/response
//! types in `scribe_api::models` (which rename fields to camelCase and hide
//! everything a client must not see).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::password::BCRYPT_MAX_PASSWORD_BYTES;

/// Role codes known to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoleCode {
    Learner,
    Author,
    Editor,
    Admin,
}

impl RoleCode {
    pub fn as_str(self) -> &'static str {
        match self {
            RoleCode::Learner => "LEARNER",
            RoleCode::Author => "AUTHOR",
            RoleCode::Editor => "EDITOR",
            RoleCode::Admin => "ADMIN",
        }
    }

    /// All role codes, in the order they are seeded.
    pub fn all() -> [RoleCode; 4] {
        [
            RoleCode::Learner,
            RoleCode::Author,
            RoleCode::Editor,
            RoleCode::Admin,
        ]
    }
}

impl fmt::Display for RoleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LEARNER" => Ok(RoleCode::Learner),
            "AUTHOR" => Ok(RoleCode::Author),
            "EDITOR" => Ok(RoleCode::Editor),
            "ADMIN" => Ok(RoleCode::Admin),
            other => Err(format!("unknown role code '{other}'")),
        }
    }
}

/// A role a user can hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub code: RoleCode,
    pub status: bool,
}

/// Domain user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub profile_pic_url: Option<String>,
    pub roles: Vec<Role>,
    pub verified: bool,
    pub status: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User with password hash (for internal auth flows).
#[derive(Debug, Clone)]
pub struct UserWithPassword {
    pub user: User,
    pub password_hash: Option<String>,
}

/// Everything needed to insert a user; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub profile_pic_url: Option<String>,
    pub password_hash: String,
    pub roles: Vec<Role>,
}

/// Sign-up input for the email + password flow.
#[derive(Debug, Clone, Deserialize)]
pub struct SignUpBasic {
    pub email: String,
    pub password: String,
    pub name: String,
    pub profile_pic_url: Option<String>,
}

const PASSWORD_MIN_LEN: usize = 6;
const PASSWORD_MAX_BYTES: usize = BCRYPT_MAX_PASSWORD_BYTES;
const NAME_MAX_LEN: usize = 200;
const EMAIL_MAX_LEN: usize = 320;
const URL_MAX_LEN: usize = 500;

impl SignUpBasic {
    /// Check field shapes, returning the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        validate_email(&self.email)?;
        if self.password.chars().count() < PASSWORD_MIN_LEN {
            return Err(format!("password must be at least {PASSWORD_MIN_LEN} characters"));
        }
        if self.password.len() > PASSWORD_MAX_BYTES {
            return Err(format!("password must be at most {PASSWORD_MAX_BYTES} bytes"));
        }
        let name = self.name.trim();
        if name.is_empty() || name.chars().count() > NAME_MAX_LEN {
            return Err(format!("name must be between 1 and {NAME_MAX_LEN} characters"));
        }
        if let Some(url) = &self.profile_pic_url
            && (!(url.starts_with("http://") || url.starts_with("https://"))
                || url.len() > URL_MAX_LEN)
        {
            return Err("profile_pic_url must be an http(s) URL".into());
        }
        Ok(())
    }
}

/// Minimal structural email check: one `@`, non-empty local part, dotted domain.
pub fn validate_email(email: &str) -> Result<(), String> {
    let invalid = || Err(format!("'{email}' is not a valid email address"));
    if email.len() > EMAIL_MAX_LEN || email.chars().any(char::is_whitespace) {
        return invalid();
    }
    let Some((local, domain)) = email.split_once('@') else {
        return invalid();
    };
    if local.is_empty() || domain.contains('@') {
        return invalid();
    }
    match domain.split_once('.') {
        Some((head, tail)) if !head.is_empty() && !tail.is_empty() && !tail.ends_with('.') => {
            Ok(())
        }
        _ => invalid(),
    }
}

/// One issuance event: binds a user to the `jti`s of an access/refresh pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystoreRecord {
    pub id: String,
    pub user_id: String,
    /// `jti` of the access token.
    pub primary_key: String,
    /// `jti` of the refresh token.
    pub secondary_key: String,
    pub status: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// JWT claims embedded in access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuer.
    pub iss: String,
    /// Subject (user ID).
    pub sub: String,
    /// Audience.
    pub aud: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Not before (unix timestamp).
    pub nbf: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Token identifier: the keystore `primary_key` or `secondary_key`.
    pub jti: String,
}

/// A freshly signed access/refresh pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Permissions an API key can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Permission {
    General,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::General => "GENERAL",
        }
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GENERAL" => Ok(Permission::General),
            other => Err(format!("unknown permission '{other}'")),
        }
    }
}

/// Client API key record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub key: String,
    pub version: i32,
    pub permissions: Vec<Permission>,
    pub comments: Vec<String>,
    pub status: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
