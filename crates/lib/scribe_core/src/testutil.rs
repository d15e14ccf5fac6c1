//! Shared test fixtures.
//!
//! Deterministic RSA keypairs and token settings for unit tests here and
//! integration tests downstream. Feature-gated behind `testutil`:
//!
//! ```toml
//! [dev-dependencies]
//! scribe_core = { workspace = true, features = ["testutil"] }
//! ```

use std::time::Duration;

use crate::auth::jwt::TokenSettings;
use crate::auth::keys::SigningKeys;

/// The service's test signing key (PKCS#1).
pub const SIGNING_PRIVATE_PEM: &[u8] = include_bytes!("../testdata/signing_private.pem");
/// Public half of [`SIGNING_PRIVATE_PEM`] (SPKI).
pub const SIGNING_PUBLIC_PEM: &[u8] = include_bytes!("../testdata/signing_public.pem");
/// An unrelated keypair, for forged-token tests.
pub const OTHER_PRIVATE_PEM: &[u8] = include_bytes!("../testdata/other_private.pem");
/// Public half of [`OTHER_PRIVATE_PEM`].
pub const OTHER_PUBLIC_PEM: &[u8] = include_bytes!("../testdata/other_public.pem");

/// Lowest bcrypt cost, to keep hashing fast in tests.
pub const TEST_BCRYPT_COST: u32 = 4;

/// The service's test keypair.
///
/// # Panics
///
/// Panics if the bundled fixtures fail to parse.
pub fn signing_keys() -> SigningKeys {
    SigningKeys::from_pem(SIGNING_PRIVATE_PEM, SIGNING_PUBLIC_PEM).expect("signing fixture")
}

/// A keypair the service does not trust.
///
/// # Panics
///
/// Panics if the bundled fixtures fail to parse.
pub fn other_signing_keys() -> SigningKeys {
    SigningKeys::from_pem(OTHER_PRIVATE_PEM, OTHER_PUBLIC_PEM).expect("other fixture")
}

/// Token settings used across tests: one hour access, seven day refresh.
pub fn token_settings() -> TokenSettings {
    TokenSettings {
        issuer: "api.scribe.test".into(),
        audience: "scribe.test".into(),
        access_validity: Duration::from_secs(3600),
        refresh_validity: Duration::from_secs(7 * 24 * 3600),
    }
}
