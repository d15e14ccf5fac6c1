//! API server configuration.

use std::path::PathBuf;
use std::time::Duration;

use scribe_core::auth::jwt::TokenSettings;
use scribe_core::auth::password::DEFAULT_BCRYPT_COST;
use scribe_core::db::DEFAULT_QUERY_TIMEOUT;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Upper bound for every storage call.
    pub query_timeout: Duration,
    /// PEM file holding the RSA private key.
    pub private_key_path: PathBuf,
    /// PEM file holding the RSA public key.
    pub public_key_path: PathBuf,
    /// Issuer, audience and validity windows for issued tokens.
    pub tokens: TokenSettings,
    /// bcrypt cost for new password hashes.
    pub bcrypt_cost: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3100".into(),
            database_url: "postgres://localhost:5432/scribe".into(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            private_key_path: PathBuf::from("keys/private.pem"),
            public_key_path: PathBuf::from("keys/public.pem"),
            tokens: TokenSettings::default(),
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }
}
