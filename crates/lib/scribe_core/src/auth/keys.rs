//! RSA signing keypair, loaded once at startup.

use std::fmt;
use std::path::Path;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::info;

use super::AuthError;

/// The RS256 keypair shared read-only by the signer and the verifier.
#[derive(Clone)]
pub struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeys").finish_non_exhaustive()
    }
}

impl SigningKeys {
    /// Build a keypair from PEM-encoded RSA keys (PKCS#1 or PKCS#8 / SPKI).
    ///
    /// A probe token is signed and verified before returning, so a
    /// mismatched or unusable pair fails here rather than on first request.
    pub fn from_pem(private_pem: &[u8], public_pem: &[u8]) -> Result<Self, AuthError> {
        let encoding = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| AuthError::KeyMaterial(format!("private key: {e}")))?;
        let decoding = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| AuthError::KeyMaterial(format!("public key: {e}")))?;
        let keys = Self { encoding, decoding };
        keys.probe()?;
        Ok(keys)
    }

    pub(crate) fn encoding(&self) -> &EncodingKey {
        &self.encoding
    }

    pub(crate) fn decoding(&self) -> &DecodingKey {
        &self.decoding
    }

    fn probe(&self) -> Result<(), AuthError> {
        let claims = serde_json::json!({ "sub": "key-probe" });
        let token = encode(&Header::new(Algorithm::RS256), &claims, &self.encoding)
            .map_err(|e| AuthError::KeyMaterial(format!("private key cannot sign: {e}")))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_aud = false;
        decode::<serde_json::Value>(&token, &self.decoding, &validation).map_err(|_| {
            AuthError::KeyMaterial("public key does not match private key".into())
        })?;
        Ok(())
    }
}

/// Read and parse the configured key files.
pub fn load_signing_keys(
    private_key_path: &Path,
    public_key_path: &Path,
) -> Result<SigningKeys, AuthError> {
    let private_pem = read_pem(private_key_path)?;
    let public_pem = read_pem(public_key_path)?;
    let keys = SigningKeys::from_pem(&private_pem, &public_pem)?;
    info!(
        private = %private_key_path.display(),
        public = %public_key_path.display(),
        "loaded RSA signing keys"
    );
    Ok(keys)
}

fn read_pem(path: &Path) -> Result<Vec<u8>, AuthError> {
    std::fs::read(path).map_err(|e| AuthError::KeyMaterial(format!("{}: {e}", path.display())))
}
