//! Authentication and authorization logic.
//!
//! Password hashing, RSA key loading, JWT issuance/verification, the session
//! keystore, API keys, and the [`service::AuthService`] orchestrator that
//! composes them for the request layer.

pub mod apikey;
pub mod jwt;
pub mod keys;
pub mod keystore;
pub mod password;
pub mod service;

use std::fmt;

use thiserror::Error;

use crate::db::StoreError;

/// Why a token failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFault {
    Malformed,
    Expired,
    NotYetValid,
    BadSignature,
    WrongIssuer,
    WrongAudience,
    /// Access and refresh token do not belong to the same issuance.
    Mismatched,
}

impl fmt::Display for TokenFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TokenFault::Malformed => "malformed token",
            TokenFault::Expired => "token expired",
            TokenFault::NotYetValid => "token not yet valid",
            TokenFault::BadSignature => "signature mismatch",
            TokenFault::WrongIssuer => "unexpected issuer",
            TokenFault::WrongAudience => "unexpected audience",
            TokenFault::Mismatched => "access and refresh token do not match",
        })
    }
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Email already registered")]
    DuplicateEmail,

    /// Unknown email and wrong password both map here.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token: {0}")]
    TokenInvalid(TokenFault),

    /// Signature checks out but no active keystore record backs the token.
    #[error("Session revoked or unknown")]
    SessionRevoked,

    #[error("Token issuance failed: {0}")]
    TokenIssuance(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Key material error: {0}")]
    KeyMaterial(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
