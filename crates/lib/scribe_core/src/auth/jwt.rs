//! JWT token generation and verification (RS256).
//!
//! [`TokenService::verify`] and [`TokenService::decode`] only prove a token
//! was signed by this service and carries our issuer and audience. Whether
//! the session behind it is still live is a keystore question, answered by
//! [`crate::auth::service::AuthService::authenticate`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation, decode, encode};
use rand::TryRngCore;
use rand::rngs::OsRng;

use super::keys::SigningKeys;
use super::{AuthError, TokenFault};
use crate::models::auth::{TokenClaims, TokenPair};

/// Access token lifetime default: 1 hour.
pub const DEFAULT_ACCESS_TOKEN_VALIDITY_SECS: u64 = 60 * 60;

/// Refresh token lifetime default: 7 days.
pub const DEFAULT_REFRESH_TOKEN_VALIDITY_SECS: u64 = 7 * 24 * 60 * 60;

/// Random bytes behind each keystore key.
const TOKEN_KEY_BYTES: usize = 32;

/// Claims every token must carry.
const REQUIRED_CLAIMS: [&str; 5] = ["exp", "nbf", "iss", "aud", "sub"];

/// Issuer, audience and validity windows stamped into every token.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub issuer: String,
    pub audience: String,
    pub access_validity: Duration,
    pub refresh_validity: Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            issuer: "api.scribe.dev".into(),
            audience: "scribe.dev".into(),
            access_validity: Duration::from_secs(DEFAULT_ACCESS_TOKEN_VALIDITY_SECS),
            refresh_validity: Duration::from_secs(DEFAULT_REFRESH_TOKEN_VALIDITY_SECS),
        }
    }
}

/// Signs and checks tokens with the process-wide keypair.
#[derive(Debug, Clone)]
pub struct TokenService {
    keys: Arc<SigningKeys>,
    settings: TokenSettings,
}

impl TokenService {
    pub fn new(keys: Arc<SigningKeys>, settings: TokenSettings) -> Self {
        Self { keys, settings }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    /// Claims for `subject` valid from `now` for `validity`.
    pub fn claims_for(
        &self,
        subject: &str,
        jti: &str,
        validity: Duration,
        now: DateTime<Utc>,
    ) -> TokenClaims {
        let iat = now.timestamp();
        TokenClaims {
            iss: self.settings.issuer.clone(),
            sub: subject.to_string(),
            aud: self.settings.audience.clone(),
            iat,
            nbf: iat,
            exp: iat.saturating_add(i64::try_from(validity.as_secs()).unwrap_or(i64::MAX)),
            jti: jti.to_string(),
        }
    }

    /// Sign a claim set with the private key.
    pub fn sign(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::RS256), claims, self.keys.encoding())
            .map_err(|e| AuthError::TokenIssuance(format!("jwt encode: {e}")))
    }

    /// Sign an access/refresh pair for `user_id` carrying the given keystore keys.
    ///
    /// Pure: persisting the keystore record is the caller's job.
    pub fn mint_pair(
        &self,
        user_id: &str,
        primary_key: &str,
        secondary_key: &str,
    ) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let access = self.claims_for(user_id, primary_key, self.settings.access_validity, now);
        let refresh = self.claims_for(user_id, secondary_key, self.settings.refresh_validity, now);
        Ok(TokenPair {
            access_token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
        })
    }

    /// Verify signature, issuer, audience, expiry and not-before.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.check(token, true)
    }

    /// Like [`Self::verify`] but accepts expired tokens.
    ///
    /// Only for identifying the owner of an expired access token during a
    /// refresh exchange.
    pub fn decode(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.check(token, false)
    }

    fn check(&self, token: &str, check_exp: bool) -> Result<TokenClaims, AuthError> {
        let validation = self.validation(check_exp);
        decode::<TokenClaims>(token, self.keys.decoding(), &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::TokenInvalid(fault_of(e.kind())))
    }

    fn validation(&self, check_exp: bool) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.settings.issuer]);
        validation.set_audience(&[&self.settings.audience]);
        validation.set_required_spec_claims(&REQUIRED_CLAIMS);
        validation.validate_exp = check_exp;
        validation.validate_nbf = true;
        validation.leeway = 0;
        validation
    }
}

fn fault_of(kind: &ErrorKind) -> TokenFault {
    match kind {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenFault::BadSignature,
        ErrorKind::ExpiredSignature => TokenFault::Expired,
        ErrorKind::ImmatureSignature => TokenFault::NotYetValid,
        ErrorKind::InvalidIssuer => TokenFault::WrongIssuer,
        ErrorKind::InvalidAudience => TokenFault::WrongAudience,
        _ => TokenFault::Malformed,
    }
}

/// Generate an opaque keystore key: 32 bytes from the OS RNG, hex-encoded.
pub fn generate_token_key() -> Result<String, AuthError> {
    let mut bytes = [0u8; TOKEN_KEY_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AuthError::TokenIssuance(format!("random key: {e}")))?;
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}
