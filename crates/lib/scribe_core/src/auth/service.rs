//! Authentication orchestrator.
//!
//! Sign-up, sign-in, sign-out and refresh, plus [`AuthService::authenticate`],
//! the gate every protected request passes through. A request is only
//! authenticated when its access token verifies *and* the keystore still
//! holds an active record for the token's `jti`; sign-out flips that record,
//! so revocation takes effect before the token expires.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::jwt::{TokenService, generate_token_key};
use super::keystore::KeystoreStore;
use super::password::{DEFAULT_BCRYPT_COST, hash_password_with_cost, verify_password};
use super::{AuthError, TokenFault};
use crate::db::StoreError;
use crate::models::auth::{
    KeystoreRecord, NewUser, RoleCode, SignUpBasic, TokenClaims, TokenPair, User,
};
use crate::users::UserStore;

/// A user together with a freshly issued token pair.
#[derive(Debug, Clone)]
pub struct UserAuth {
    pub user: User,
    pub tokens: TokenPair,
}

/// What the gate hands to protected handlers.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub keystore: KeystoreRecord,
    pub claims: TokenClaims,
}

/// Composes credential checks, token signing and the keystore.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    keystore: Arc<dyn KeystoreStore>,
    tokens: TokenService,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        keystore: Arc<dyn KeystoreStore>,
        tokens: TokenService,
    ) -> Self {
        Self {
            users,
            keystore,
            tokens,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }

    /// Override the bcrypt cost used for new password hashes.
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub async fn is_email_registered(&self, email: &str) -> Result<bool, AuthError> {
        Ok(self.users.find_by_email(email).await?.is_some())
    }

    /// Register a new learner and sign them in.
    pub async fn sign_up_basic(&self, input: SignUpBasic) -> Result<UserAuth, AuthError> {
        input.validate().map_err(AuthError::Validation)?;

        if self.is_email_registered(&input.email).await? {
            return Err(AuthError::DuplicateEmail);
        }

        let role = self
            .users
            .find_role_by_code(RoleCode::Learner)
            .await?
            .ok_or_else(|| {
                AuthError::Internal(format!("role {} not configured", RoleCode::Learner))
            })?;

        let password_hash = hash_password_with_cost(&input.password, self.bcrypt_cost)?;

        let user = self
            .users
            .create(NewUser {
                email: input.email,
                name: input.name.trim().to_string(),
                profile_pic_url: input.profile_pic_url,
                password_hash,
                roles: vec![role],
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => AuthError::DuplicateEmail,
                other => AuthError::Persistence(other),
            })?;
        info!(user_id = %user.id, "user signed up");

        let tokens = self.issue_token_pair(&user).await?;
        Ok(UserAuth { user, tokens })
    }

    /// Check email + password and open a new session.
    ///
    /// Unknown email and wrong password fail identically.
    pub async fn sign_in_basic(&self, email: &str, password: &str) -> Result<UserAuth, AuthError> {
        let Some(found) = self.users.find_by_email(email).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        let Some(hash) = found.password_hash.as_deref() else {
            return Err(AuthError::InvalidCredentials);
        };
        if !found.user.status || !verify_password(password, hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.issue_token_pair(&found.user).await?;
        info!(user_id = %found.user.id, "user signed in");
        Ok(UserAuth {
            user: found.user,
            tokens,
        })
    }

    /// Mint an access/refresh pair and record it in the keystore.
    ///
    /// Both tokens are signed before the record is written; if the write
    /// fails, nothing is returned.
    pub async fn issue_token_pair(&self, user: &User) -> Result<TokenPair, AuthError> {
        let (pair, _) = self.issue_session(user).await?;
        Ok(pair)
    }

    async fn issue_session(&self, user: &User) -> Result<(TokenPair, KeystoreRecord), AuthError> {
        let primary_key = generate_token_key()?;
        let secondary_key = generate_token_key()?;
        let pair = self.tokens.mint_pair(&user.id, &primary_key, &secondary_key)?;

        let record = self
            .keystore
            .create(&user.id, &primary_key, &secondary_key)
            .await?;
        debug!(user_id = %user.id, keystore_id = %record.id, "issued token pair");
        Ok((pair, record))
    }

    /// The authenticated-request gate.
    pub async fn authenticate(&self, access_token: &str) -> Result<Session, AuthError> {
        let claims = self.tokens.verify(access_token)?;

        let Some(keystore) = self
            .keystore
            .find_active_by_primary_key(&claims.jti, &claims.sub)
            .await?
        else {
            debug!(user_id = %claims.sub, "no active keystore record for access token");
            return Err(AuthError::SessionRevoked);
        };

        let user = match self.users.find_by_id(&claims.sub).await? {
            Some(user) if user.status => user,
            _ => {
                debug!(user_id = %claims.sub, "token subject missing or disabled");
                return Err(AuthError::SessionRevoked);
            }
        };

        Ok(Session {
            user,
            keystore,
            claims,
        })
    }

    /// Close the session behind `record`. Safe to repeat.
    pub async fn sign_out(&self, record: &KeystoreRecord) -> Result<(), AuthError> {
        self.keystore.invalidate(record).await?;
        info!(user_id = %record.user_id, keystore_id = %record.id, "user signed out");
        Ok(())
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// The access token may already be expired but must come from the same
    /// issuance as the refresh token. The consumed record is invalidated, so
    /// each refresh token works once.
    ///
    /// The new record is written before the old one is invalidated. If the
    /// invalidation fails the new record is withdrawn and the old session
    /// stays usable.
    pub async fn refresh(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<TokenPair, AuthError> {
        let refresh_claims = self.tokens.verify(refresh_token)?;
        let access_claims = self.tokens.decode(access_token)?;
        if access_claims.sub != refresh_claims.sub {
            return Err(AuthError::TokenInvalid(TokenFault::Mismatched));
        }

        let user = match self.users.find_by_id(&refresh_claims.sub).await? {
            Some(user) if user.status => user,
            _ => return Err(AuthError::SessionRevoked),
        };

        let record = self
            .keystore
            .find_active_by_secondary_key(&refresh_claims.jti, &user.id)
            .await?
            .ok_or(AuthError::SessionRevoked)?;
        if record.primary_key != access_claims.jti {
            return Err(AuthError::TokenInvalid(TokenFault::Mismatched));
        }

        let (pair, issued) = self.issue_session(&user).await?;
        if let Err(e) = self.keystore.invalidate(&record).await {
            if let Err(rollback) = self.keystore.invalidate(&issued).await {
                warn!(keystore_id = %issued.id, "could not withdraw new session: {rollback}");
            }
            return Err(e.into());
        }
        info!(user_id = %user.id, rotated = %record.id, "token pair refreshed");
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::auth::keystore::MemoryKeystore;
    use crate::auth::password::BCRYPT_MAX_PASSWORD_BYTES;
    use crate::testutil::{TEST_BCRYPT_COST, other_signing_keys, signing_keys, token_settings};
    use crate::users::MemoryUserStore;

    struct Fixture {
        auth: AuthService,
        users: Arc<MemoryUserStore>,
        keystore: Arc<MemoryKeystore>,
    }

    fn fixture() -> Fixture {
        let users = Arc::new(MemoryUserStore::new());
        let keystore = Arc::new(MemoryKeystore::new());
        let tokens = TokenService::new(Arc::new(signing_keys()), token_settings());
        let auth = AuthService::new(users.clone(), keystore.clone(), tokens)
            .with_bcrypt_cost(TEST_BCRYPT_COST);
        Fixture {
            auth,
            users,
            keystore,
        }
    }

    fn signup(email: &str, password: &str) -> SignUpBasic {
        SignUpBasic {
            email: email.into(),
            password: password.into(),
            name: "Ada Lovelace".into(),
            profile_pic_url: None,
        }
    }

    #[tokio::test]
    async fn sign_up_then_sign_in_open_distinct_sessions() {
        let fx = fixture();
        let up = fx
            .auth
            .sign_up_basic(signup("a@example.com", "secret123"))
            .await
            .unwrap();
        assert_eq!(up.user.roles.len(), 1);
        assert_eq!(up.user.roles[0].code, RoleCode::Learner);

        let inn = fx.auth.sign_in_basic("a@example.com", "secret123").await.unwrap();
        assert_eq!(inn.user.id, up.user.id);

        let first = fx.auth.authenticate(&up.tokens.access_token).await.unwrap();
        let second = fx.auth.authenticate(&inn.tokens.access_token).await.unwrap();
        assert_ne!(first.keystore.id, second.keystore.id);
        assert_ne!(first.claims.jti, second.claims.jti);
        assert_eq!(fx.keystore.active_count(), 2);
    }

    #[tokio::test]
    async fn duplicate_sign_up_creates_nothing() {
        let fx = fixture();
        fx.auth
            .sign_up_basic(signup("a@example.com", "secret123"))
            .await
            .unwrap();

        let err = fx
            .auth
            .sign_up_basic(signup("a@example.com", "other-pass"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));
        assert_eq!(fx.users.len(), 1);
        assert_eq!(fx.keystore.len(), 1);
    }

    #[tokio::test]
    async fn malformed_sign_up_is_a_validation_error() {
        let fx = fixture();
        let err = fx
            .auth
            .sign_up_basic(signup("not-an-email", "secret123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        assert!(fx.users.is_empty());
    }

    #[tokio::test]
    async fn missing_learner_role_is_internal() {
        let users = Arc::new(MemoryUserStore::with_roles(Vec::new()));
        let tokens = TokenService::new(Arc::new(signing_keys()), token_settings());
        let auth = AuthService::new(users.clone(), Arc::new(MemoryKeystore::new()), tokens)
            .with_bcrypt_cost(TEST_BCRYPT_COST);

        let err = auth
            .sign_up_basic(signup("a@example.com", "secret123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let fx = fixture();
        fx.auth
            .sign_up_basic(signup("a@example.com", "secret123"))
            .await
            .unwrap();

        let wrong_password = fx
            .auth
            .sign_in_basic("a@example.com", "secret124")
            .await
            .unwrap_err();
        let unknown_email = fx
            .auth
            .sign_in_basic("b@example.com", "secret123")
            .await
            .unwrap_err();

        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_email, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
        assert_eq!(fx.keystore.len(), 1);
    }

    #[tokio::test]
    async fn wrong_password_sharing_the_hashed_prefix_is_rejected() {
        let fx = fixture();
        let prefix = "x".repeat(BCRYPT_MAX_PASSWORD_BYTES);
        fx.auth
            .sign_up_basic(signup("a@example.com", &prefix))
            .await
            .unwrap();

        let err = fx
            .auth
            .sign_in_basic("a@example.com", &format!("{prefix}WRONG-TAIL-entirely"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(fx.auth.sign_in_basic("a@example.com", &prefix).await.is_ok());
    }

    #[tokio::test]
    async fn over_long_password_cannot_sign_up() {
        let fx = fixture();
        let err = fx
            .auth
            .sign_up_basic(signup("a@example.com", &format!("{}correct-tail", "x".repeat(72))))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        assert!(fx.users.is_empty());
    }

    #[tokio::test]
    async fn access_token_claims_match_user_and_window() {
        let fx = fixture();
        let up = fx
            .auth
            .sign_up_basic(signup("a@example.com", "secret123"))
            .await
            .unwrap();

        let claims = fx.auth.tokens().verify(&up.tokens.access_token).unwrap();
        assert_eq!(claims.sub, up.user.id);
        let window = fx.auth.tokens().settings().access_validity.as_secs() as i64;
        assert_eq!(claims.exp - claims.iat, window);
    }

    #[tokio::test]
    async fn sign_out_revokes_session_while_token_still_verifies() {
        let fx = fixture();
        let up = fx
            .auth
            .sign_up_basic(signup("a@example.com", "secret123"))
            .await
            .unwrap();
        let session = fx.auth.authenticate(&up.tokens.access_token).await.unwrap();

        fx.auth.sign_out(&session.keystore).await.unwrap();
        fx.auth.sign_out(&session.keystore).await.unwrap();

        assert!(fx.auth.tokens().verify(&up.tokens.access_token).is_ok());
        let err = fx.auth.authenticate(&up.tokens.access_token).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionRevoked));
    }

    #[tokio::test]
    async fn gate_rejects_forged_tokens() {
        let fx = fixture();
        let up = fx
            .auth
            .sign_up_basic(signup("a@example.com", "secret123"))
            .await
            .unwrap();
        let session = fx.auth.authenticate(&up.tokens.access_token).await.unwrap();

        // same jti and subject, wrong key
        let forger = TokenService::new(Arc::new(other_signing_keys()), token_settings());
        let forged = forger.sign(&session.claims).unwrap();
        let err = fx.auth.authenticate(&forged).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid(TokenFault::BadSignature)));
    }

    #[tokio::test]
    async fn refresh_token_is_not_an_access_token() {
        let fx = fixture();
        let up = fx
            .auth
            .sign_up_basic(signup("a@example.com", "secret123"))
            .await
            .unwrap();
        let err = fx.auth.authenticate(&up.tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionRevoked));
    }

    #[tokio::test]
    async fn sign_out_then_sign_in_scenario() {
        let fx = fixture();
        let up = fx
            .auth
            .sign_up_basic(signup("a@example.com", "secret123"))
            .await
            .unwrap();

        let session = fx.auth.authenticate(&up.tokens.access_token).await.unwrap();
        fx.auth.sign_out(&session.keystore).await.unwrap();
        assert!(fx.auth.authenticate(&up.tokens.access_token).await.is_err());

        let again = fx.auth.sign_in_basic("a@example.com", "secret123").await.unwrap();
        let fresh = fx.auth.authenticate(&again.tokens.access_token).await.unwrap();
        assert_ne!(fresh.claims.jti, session.claims.jti);
        assert_eq!(fresh.user.id, up.user.id);
    }

    #[tokio::test]
    async fn refresh_rotates_the_pair() {
        let fx = fixture();
        let up = fx
            .auth
            .sign_up_basic(signup("a@example.com", "secret123"))
            .await
            .unwrap();

        let next = fx
            .auth
            .refresh(&up.tokens.access_token, &up.tokens.refresh_token)
            .await
            .unwrap();

        assert!(fx.auth.authenticate(&next.access_token).await.is_ok());
        let err = fx.auth.authenticate(&up.tokens.access_token).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionRevoked));

        let reuse = fx
            .auth
            .refresh(&up.tokens.access_token, &up.tokens.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(reuse, AuthError::SessionRevoked));
        assert_eq!(fx.keystore.active_count(), 1);
    }

    #[tokio::test]
    async fn refresh_accepts_an_expired_access_token() {
        let fx = fixture();
        let up = fx
            .auth
            .sign_up_basic(signup("a@example.com", "secret123"))
            .await
            .unwrap();
        let record = fx.keystore.create(&up.user.id, "pk-old", "sk-old").await.unwrap();

        let tokens = fx.auth.tokens();
        let issued = Utc::now() - chrono::Duration::hours(2);
        let expired_access = tokens
            .sign(&tokens.claims_for(&up.user.id, "pk-old", Duration::from_secs(60), issued))
            .unwrap();
        let refresh_claims =
            tokens.claims_for(&up.user.id, "sk-old", Duration::from_secs(86_400), Utc::now());
        let refresh = tokens.sign(&refresh_claims).unwrap();

        let next = fx.auth.refresh(&expired_access, &refresh).await.unwrap();
        assert!(fx.auth.authenticate(&next.access_token).await.is_ok());
        assert!(
            fx.keystore
                .find_active_by_primary_key(&record.primary_key, &up.user.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn refresh_rejects_tokens_from_different_sessions() {
        let fx = fixture();
        let up = fx
            .auth
            .sign_up_basic(signup("a@example.com", "secret123"))
            .await
            .unwrap();
        let other = fx.auth.sign_in_basic("a@example.com", "secret123").await.unwrap();

        let err = fx
            .auth
            .refresh(&up.tokens.access_token, &other.tokens.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid(TokenFault::Mismatched)));
        assert_eq!(fx.keystore.active_count(), 2);
    }

    #[tokio::test]
    async fn refresh_rejects_tokens_of_different_users() {
        let fx = fixture();
        let a = fx
            .auth
            .sign_up_basic(signup("a@example.com", "secret123"))
            .await
            .unwrap();
        let b = fx
            .auth
            .sign_up_basic(signup("b@example.com", "secret123"))
            .await
            .unwrap();

        let err = fx
            .auth
            .refresh(&a.tokens.access_token, &b.tokens.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid(TokenFault::Mismatched)));
    }

    struct FailingKeystore;

    #[async_trait]
    impl KeystoreStore for FailingKeystore {
        async fn create(&self, _: &str, _: &str, _: &str) -> Result<KeystoreRecord, StoreError> {
            Err(StoreError::Timeout(Duration::from_secs(10)))
        }

        async fn find_active_by_primary_key(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Option<KeystoreRecord>, StoreError> {
            Ok(None)
        }

        async fn find_active_by_secondary_key(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Option<KeystoreRecord>, StoreError> {
            Ok(None)
        }

        async fn invalidate(&self, _: &KeystoreRecord) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_keystore_write_returns_no_tokens() {
        let users = Arc::new(MemoryUserStore::new());
        let tokens = TokenService::new(Arc::new(signing_keys()), token_settings());
        let auth = AuthService::new(users.clone(), Arc::new(FailingKeystore), tokens)
            .with_bcrypt_cost(TEST_BCRYPT_COST);

        let err = auth
            .sign_up_basic(signup("a@example.com", "secret123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Persistence(StoreError::Timeout(_))));

        let err = auth.sign_in_basic("a@example.com", "secret123").await.unwrap_err();
        assert!(matches!(err, AuthError::Persistence(_)));
    }

    /// Memory keystore that can be told to fail writes.
    #[derive(Default)]
    struct FlakyKeystore {
        inner: MemoryKeystore,
        fail_create: AtomicBool,
        fail_invalidate_of: Mutex<Option<String>>,
    }

    #[async_trait]
    impl KeystoreStore for FlakyKeystore {
        async fn create(
            &self,
            user_id: &str,
            primary_key: &str,
            secondary_key: &str,
        ) -> Result<KeystoreRecord, StoreError> {
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(StoreError::Timeout(Duration::from_secs(10)));
            }
            self.inner.create(user_id, primary_key, secondary_key).await
        }

        async fn find_active_by_primary_key(
            &self,
            primary_key: &str,
            user_id: &str,
        ) -> Result<Option<KeystoreRecord>, StoreError> {
            self.inner.find_active_by_primary_key(primary_key, user_id).await
        }

        async fn find_active_by_secondary_key(
            &self,
            secondary_key: &str,
            user_id: &str,
        ) -> Result<Option<KeystoreRecord>, StoreError> {
            self.inner.find_active_by_secondary_key(secondary_key, user_id).await
        }

        async fn invalidate(&self, record: &KeystoreRecord) -> Result<(), StoreError> {
            let fail =
                self.fail_invalidate_of.lock().unwrap().as_deref() == Some(record.id.as_str());
            if fail {
                return Err(StoreError::Timeout(Duration::from_secs(10)));
            }
            self.inner.invalidate(record).await
        }
    }

    fn flaky_fixture() -> (AuthService, Arc<FlakyKeystore>) {
        let keystore = Arc::new(FlakyKeystore::default());
        let tokens = TokenService::new(Arc::new(signing_keys()), token_settings());
        let auth = AuthService::new(Arc::new(MemoryUserStore::new()), keystore.clone(), tokens)
            .with_bcrypt_cost(TEST_BCRYPT_COST);
        (auth, keystore)
    }

    #[tokio::test]
    async fn failed_refresh_write_keeps_the_old_session() {
        let (auth, keystore) = flaky_fixture();
        let up = auth
            .sign_up_basic(signup("a@example.com", "secret123"))
            .await
            .unwrap();

        keystore.fail_create.store(true, Ordering::SeqCst);
        let err = auth
            .refresh(&up.tokens.access_token, &up.tokens.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Persistence(_)));
        assert!(auth.authenticate(&up.tokens.access_token).await.is_ok());

        keystore.fail_create.store(false, Ordering::SeqCst);
        let next = auth
            .refresh(&up.tokens.access_token, &up.tokens.refresh_token)
            .await
            .unwrap();
        assert!(auth.authenticate(&next.access_token).await.is_ok());
    }

    #[tokio::test]
    async fn failed_refresh_invalidation_withdraws_the_new_session() {
        let (auth, keystore) = flaky_fixture();
        let up = auth
            .sign_up_basic(signup("a@example.com", "secret123"))
            .await
            .unwrap();
        let session = auth.authenticate(&up.tokens.access_token).await.unwrap();

        *keystore.fail_invalidate_of.lock().unwrap() = Some(session.keystore.id.clone());
        let err = auth
            .refresh(&up.tokens.access_token, &up.tokens.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Persistence(_)));
        assert!(auth.authenticate(&up.tokens.access_token).await.is_ok());
        assert_eq!(keystore.inner.active_count(), 1);
    }
}
