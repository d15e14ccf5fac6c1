//! Password hashing via bcrypt.
//!
//! bcrypt only reads the first 72 bytes of its NUL-terminated input. Longer
//! passwords are refused rather than silently truncated.

use bcrypt::BcryptError;

use super::AuthError;

/// Default bcrypt cost factor.
pub const DEFAULT_BCRYPT_COST: u32 = 10;

/// Longest password, in bytes, bcrypt can hash without truncation.
pub const BCRYPT_MAX_PASSWORD_BYTES: usize = 71;

/// Hash a password with bcrypt at the default cost.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    hash_password_with_cost(password, DEFAULT_BCRYPT_COST)
}

/// Hash a password with bcrypt at `cost` (4..=31).
pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String, AuthError> {
    bcrypt::non_truncating_hash(password, cost).map_err(|e| match e {
        BcryptError::Truncation(_) => AuthError::Validation(format!(
            "password must be at most {BCRYPT_MAX_PASSWORD_BYTES} bytes"
        )),
        e => AuthError::Hashing(format!("bcrypt hash: {e}")),
    })
}

/// Verify a password against a bcrypt hash.
///
/// A mismatch is `Ok(false)`, as is a password too long to have been hashed.
/// Only an unparseable stored hash is an error.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    match bcrypt::non_truncating_verify(password, hash) {
        Ok(matched) => Ok(matched),
        Err(BcryptError::Truncation(_)) => Ok(false),
        Err(e) => Err(AuthError::Hashing(format!("bcrypt verify: {e}"))),
    }
}
