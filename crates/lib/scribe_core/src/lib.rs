//! # scribe_core
//!
//! Core domain logic for Scribe: password hashing, RSA signing keys,
//! JWT issuance and verification, the session keystore, and the user and
//! API-key stores the authentication flow depends on.

pub mod auth;
pub mod db;
pub mod migrate;
pub mod models;
pub mod users;
pub mod uuid;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
