//! The notary: issues, verifies and revokes every credential type.
//!
//! A [`Notary`] owns its signing key pair, authorization-code cipher and a
//! handle on the access-token registry. All of it is immutable after
//! construction, so one instance is shared across tasks behind an `Arc`.
//!
//! # Usage
//!
//! ```ignore
//! use notary_auth::{Notary, NotaryConfig, Scope};
//!
//! let notary = Arc::new(Notary::from_config(&config).await?);
//!
//! let token = notary
//!     .mint_access_token(Duration::from_secs(3600), 42, Scope::from_iter(["read"]))
//!     .await?;
//! notary.verify_access_token(&token, 42, ["read"]).await?;
//! notary.revoke_access_token(&token).await?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::NotaryResult;
use crate::config::NotaryConfig;
use crate::error::NotaryError;
use crate::identity::{Jwks, SigningAlgorithm, SigningKeyPair, key_fingerprint};
use crate::storage::{TokenStore, create_token_store};
use crate::token::{
    AccessTokenRecord, AuthorizationCode, AuthorizationCodec, IdentitySigner,
    generate_access_token, token_fingerprint,
};
use crate::types::{ClientId, IdentityClaims, PermissionId, Scope, UserId};

const DEFAULT_ISSUER: &str = "http://localhost:8080";
const DEFAULT_ID_TOKEN_LIFETIME: Duration = Duration::from_secs(30 * 24 * 3600);
const DEFAULT_ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);
const DEFAULT_MAX_MINT_ATTEMPTS: u32 = 8;

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn lifetime_secs(lifetime: Duration) -> i64 {
    i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX)
}

/// Credential façade.
pub struct Notary {
    signer: IdentitySigner,
    codec: AuthorizationCodec,
    store: Arc<dyn TokenStore>,
    issuer: String,
    id_token_lifetime: Duration,
    access_token_lifetime: Duration,
    max_mint_attempts: u32,
}

/// Builder for [`Notary`].
pub struct NotaryBuilder {
    key: SigningKeyPair,
    codec: AuthorizationCodec,
    store: Arc<dyn TokenStore>,
    issuer: String,
    id_token_lifetime: Duration,
    access_token_lifetime: Duration,
    max_mint_attempts: u32,
}

impl NotaryBuilder {
    /// Sets the issuer stamped into identity tokens that lack one.
    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Sets the identity-token validity window.
    #[must_use]
    pub fn id_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.id_token_lifetime = lifetime;
        self
    }

    /// Sets the default access-token lifetime used by the grant flow.
    #[must_use]
    pub fn access_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.access_token_lifetime = lifetime;
        self
    }

    /// Sets how many candidate access tokens are tried before giving up.
    #[must_use]
    pub fn max_mint_attempts(mut self, attempts: u32) -> Self {
        self.max_mint_attempts = attempts;
        self
    }

    /// Builds the notary, checking the key pair with a probe signature.
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::Configuration` if the private and public keys do
    /// not belong together, or if a limit is zero.
    pub fn build(self) -> NotaryResult<Notary> {
        if self.max_mint_attempts == 0 {
            return Err(NotaryError::configuration("max_mint_attempts must be > 0"));
        }
        if self.id_token_lifetime.is_zero() {
            return Err(NotaryError::configuration("id_token_lifetime must be > 0"));
        }
        if self.access_token_lifetime.as_secs() == 0 {
            return Err(NotaryError::configuration(
                "access_token_lifetime must be at least one second",
            ));
        }

        let signer = IdentitySigner::new(self.key);
        probe(&signer)?;

        tracing::debug!(
            algorithm = %signer.algorithm(),
            kid = %signer.current_kid(),
            issuer = %self.issuer,
            "notary ready"
        );

        Ok(Notary {
            signer,
            codec: self.codec,
            store: self.store,
            issuer: self.issuer,
            id_token_lifetime: self.id_token_lifetime,
            access_token_lifetime: self.access_token_lifetime,
            max_mint_attempts: self.max_mint_attempts,
        })
    }
}

/// Signs and verifies a throwaway token so that a broken key pair fails at
/// construction rather than on the first request.
fn probe(signer: &IdentitySigner) -> NotaryResult<()> {
    let now = now();
    let mut claims = IdentityClaims::new("", "", "probe");
    claims.iat = now;
    claims.nbf = now;
    claims.exp = now + 60;

    signer
        .encode(&claims)
        .and_then(|token| signer.decode(&token))
        .map(|_| ())
        .map_err(|e| NotaryError::configuration(format!("signing key pair self-check failed: {e}")))
}

impl Notary {
    /// Starts building a notary from its parts.
    #[must_use]
    pub fn builder(
        key: SigningKeyPair,
        codec: AuthorizationCodec,
        store: Arc<dyn TokenStore>,
    ) -> NotaryBuilder {
        NotaryBuilder {
            key,
            codec,
            store,
            issuer: DEFAULT_ISSUER.to_string(),
            id_token_lifetime: DEFAULT_ID_TOKEN_LIFETIME,
            access_token_lifetime: DEFAULT_ACCESS_TOKEN_LIFETIME,
            max_mint_attempts: DEFAULT_MAX_MINT_ATTEMPTS,
        }
    }

    /// Builds a notary from validated configuration, connecting the token store.
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::Configuration` for invalid settings or key
    /// material, and `NotaryError::Store` if the token store is unreachable.
    pub async fn from_config(config: &NotaryConfig) -> NotaryResult<Self> {
        config.validate()?;

        let algorithm: SigningAlgorithm = config.signing.algorithm()?;
        let private_pem = config.signing.private_key()?;
        let public_pem = config.signing.public_key()?;
        let kid = config
            .signing
            .key_id
            .clone()
            .unwrap_or_else(|| key_fingerprint(&public_pem));
        let key = SigningKeyPair::from_pem(kid, algorithm, &private_pem, &public_pem)?;

        let codec = AuthorizationCodec::new(&config.code.cipher_key()?)?;
        let store = create_token_store(&config.token_store).await?;

        Self::builder(key, codec, store)
            .issuer(config.issuer.clone())
            .id_token_lifetime(config.id_token_lifetime)
            .access_token_lifetime(config.access_token_lifetime)
            .max_mint_attempts(config.max_mint_attempts)
            .build()
    }

    // ------------------------------------------------------------------
    // Identity tokens
    // ------------------------------------------------------------------

    /// Signs an identity token.
    ///
    /// Stamps `iat` and `nbf` with the current time and `exp` with the end of
    /// the identity-token lifetime; fills `iss` and `jti` when empty.
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::Internal` only if the claims cannot be
    /// serialized; the key itself was checked at construction.
    pub fn sign_identity_token(&self, mut claims: IdentityClaims) -> NotaryResult<String> {
        let now = now();
        claims.iat = now;
        claims.nbf = now;
        claims.exp = now.saturating_add(lifetime_secs(self.id_token_lifetime));
        if claims.iss.is_empty() {
            claims.iss.clone_from(&self.issuer);
        }
        if claims.jti.is_none() {
            claims.jti = Some(Uuid::new_v4().to_string());
        }

        let token = self.signer.encode(&claims)?;
        tracing::debug!(sub = %claims.sub, aud = %claims.aud, "identity token signed");
        Ok(token)
    }

    /// Verifies an identity token and returns its claims.
    ///
    /// # Errors
    ///
    /// - `NotaryError::Signature` on a forged signature or foreign algorithm
    /// - `NotaryError::Expired` when now is outside `[nbf, exp]`
    /// - `NotaryError::MalformedToken` when the token cannot be parsed
    pub fn verify_identity_token(&self, token: &str) -> NotaryResult<IdentityClaims> {
        self.signer.decode(token).inspect_err(|e| {
            tracing::debug!(error = %e, "identity token rejected");
        })
    }

    // ------------------------------------------------------------------
    // Access tokens
    // ------------------------------------------------------------------

    /// Mints an opaque access token for `user_id` valid for `lifetime`.
    ///
    /// Candidates are registered with an atomic insert-if-absent, so two
    /// concurrent minters can never end up sharing a token.
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::Store` if the store fails or every candidate
    /// collided, and `NotaryError::Configuration` for a sub-second lifetime.
    pub async fn mint_access_token(
        &self,
        lifetime: Duration,
        user_id: UserId,
        scope: Scope,
    ) -> NotaryResult<String> {
        if lifetime.as_secs() == 0 {
            return Err(NotaryError::configuration(
                "access token lifetime must be at least one second",
            ));
        }

        for attempt in 1..=self.max_mint_attempts {
            let now = now();
            let token = generate_access_token(now);
            let record = AccessTokenRecord::new(
                user_id,
                scope.clone(),
                now.saturating_add(lifetime_secs(lifetime)),
            );

            if self.store.insert_if_absent(&token, &record).await? {
                tracing::debug!(
                    token = %token_fingerprint(&token),
                    user_id,
                    expires_at = record.expires_at,
                    "access token minted"
                );
                return Ok(token);
            }

            tracing::warn!(attempt, "access token candidate collided");
        }

        Err(NotaryError::store(format!(
            "no free access token after {} attempts",
            self.max_mint_attempts
        )))
    }

    /// Verifies that `token` is live, belongs to `user_id` and covers every
    /// `required` permission. Returns the stored record.
    ///
    /// # Errors
    ///
    /// - `NotaryError::NotFound` if the token is absent, expired or revoked
    /// - `NotaryError::IdentityMismatch` if it was issued to another user
    /// - `NotaryError::InsufficientScope` if a permission is missing
    /// - `NotaryError::Store` if the store fails
    pub async fn verify_access_token<I, S>(
        &self,
        token: &str,
        user_id: UserId,
        required: I,
    ) -> NotaryResult<AccessTokenRecord>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let required: Vec<String> = required
            .into_iter()
            .map(|permission| permission.as_ref().to_string())
            .collect();

        let record = self.store.get(token).await?;

        if record.user_id != user_id {
            tracing::debug!(
                token = %token_fingerprint(token),
                user_id,
                "access token presented by another user"
            );
            return Err(NotaryError::IdentityMismatch);
        }

        if !record.scope.contains_all(&required) {
            return Err(NotaryError::insufficient_scope(&required));
        }

        Ok(record)
    }

    /// Revokes an access token. Revoking an unknown token succeeds.
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::Store` if the store fails.
    pub async fn revoke_access_token(&self, token: &str) -> NotaryResult<()> {
        self.store.remove(token).await?;
        tracing::debug!(token = %token_fingerprint(token), "access token revoked");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Authorization codes
    // ------------------------------------------------------------------

    /// Mints an authorization code.
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::ScopeOverflow` for more than 25 permissions.
    pub fn mint_authorization_code(
        &self,
        client_id: ClientId,
        scope_ids: &[PermissionId],
        user_id: UserId,
    ) -> NotaryResult<String> {
        self.codec.encode(client_id, scope_ids, user_id)
    }

    /// Deciphers an authorization code.
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::InvalidCode` for any malformed, foreign or
    /// tampered code.
    pub fn decipher_authorization_code(&self, code: &str) -> NotaryResult<AuthorizationCode> {
        self.codec.decode(code)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Returns the JWKS relying parties use to verify identity tokens.
    #[must_use]
    pub fn jwks(&self) -> Jwks {
        self.signer.jwks()
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the default access-token lifetime.
    #[must_use]
    pub fn access_token_lifetime(&self) -> Duration {
        self.access_token_lifetime
    }

    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.signer.algorithm()
    }

    /// Returns the token store handle.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Releases the token store's connections.
    ///
    /// Callers must drain in-flight operations first; anything still running
    /// against the store afterwards fails with `NotaryError::Store`.
    pub async fn close(&self) {
        self.store.close().await;
    }
}

impl fmt::Debug for Notary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notary")
            .field("issuer", &self.issuer)
            .field("algorithm", &self.signer.algorithm())
            .field("kid", &self.signer.current_kid())
            .field("codec", &self.codec)
            .field("id_token_lifetime", &self.id_token_lifetime)
            .field("access_token_lifetime", &self.access_token_lifetime)
            .field("max_mint_attempts", &self.max_mint_attempts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::OnceLock;

    use async_trait::async_trait;

    use super::*;
    use crate::identity::{PemKeyPair, generate_pem_pair};
    use crate::storage::MemoryTokenStore;

    const CIPHER_KEY: [u8; 32] = [7; 32];

    fn pem() -> &'static PemKeyPair {
        static PEM: OnceLock<PemKeyPair> = OnceLock::new();
        PEM.get_or_init(|| generate_pem_pair(SigningAlgorithm::RS512).unwrap())
    }

    fn key(algorithm: SigningAlgorithm) -> SigningKeyPair {
        let pem = pem();
        SigningKeyPair::from_pem("test", algorithm, &pem.private_pem, &pem.public_pem).unwrap()
    }

    fn notary_with(store: Arc<dyn TokenStore>) -> Notary {
        Notary::builder(
            key(SigningAlgorithm::RS512),
            AuthorizationCodec::new(&CIPHER_KEY).unwrap(),
            store,
        )
        .issuer("https://auth.example.com")
        .build()
        .unwrap()
    }

    fn notary() -> Notary {
        notary_with(Arc::new(MemoryTokenStore::new()))
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_revocation() {
        let notary = notary();
        let token = notary
            .mint_access_token(HOUR, 42, Scope::from_iter(["read"]))
            .await
            .unwrap();

        notary.verify_access_token(&token, 42, ["read"]).await.unwrap();
        notary.revoke_access_token(&token).await.unwrap();

        assert!(matches!(
            notary.verify_access_token(&token, 42, ["read"]).await,
            Err(NotaryError::NotFound)
        ));
        // Revoking twice is fine.
        notary.revoke_access_token(&token).await.unwrap();
    }

    #[tokio::test]
    async fn test_identity_mismatch() {
        let notary = notary();
        let token = notary
            .mint_access_token(HOUR, 42, Scope::from_iter(["read"]))
            .await
            .unwrap();

        assert!(matches!(
            notary.verify_access_token(&token, 43, ["read"]).await,
            Err(NotaryError::IdentityMismatch)
        ));
    }

    #[tokio::test]
    async fn test_insufficient_scope() {
        let notary = notary();
        let token = notary
            .mint_access_token(HOUR, 42, Scope::from_iter(["write", "read"]))
            .await
            .unwrap();

        notary
            .verify_access_token(&token, 42, ["read", "write"])
            .await
            .unwrap();
        notary
            .verify_access_token(&token, 42, Vec::<String>::new())
            .await
            .unwrap();

        match notary.verify_access_token(&token, 42, ["read", "admin"]).await {
            Err(NotaryError::InsufficientScope { required }) => assert_eq!(required, "read admin"),
            other => panic!("expected InsufficientScope, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_token_not_found() {
        let notary = notary();
        assert!(matches!(
            notary.verify_access_token("bm90LWEtdG9rZW4=", 1, ["read"]).await,
            Err(NotaryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_minted_record() {
        let notary = notary();
        let before = now();
        let token = notary
            .mint_access_token(HOUR, 42, Scope::from_iter(["read"]))
            .await
            .unwrap();

        let record = notary.store().get(&token).await.unwrap();
        assert_eq!(record.user_id, 42);
        assert!(record.expires_at >= before + 3600);
        assert!(record.expires_at <= now() + 3600);
    }

    #[tokio::test]
    async fn test_zero_lifetime_rejected() {
        let notary = notary();
        assert!(
            notary
                .mint_access_token(Duration::ZERO, 42, Scope::new())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_concurrent_mints_are_distinct() {
        let notary = Arc::new(notary());
        let handles: Vec<_> = (0..64)
            .map(|user_id| {
                let notary = notary.clone();
                tokio::spawn(async move {
                    notary
                        .mint_access_token(HOUR, user_id, Scope::from_iter(["read"]))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut tokens = HashSet::new();
        for handle in handles {
            tokens.insert(handle.await.unwrap());
        }
        assert_eq!(tokens.len(), 64);
    }

    /// Store that reports every candidate as taken.
    struct SaturatedStore;

    #[async_trait]
    impl TokenStore for SaturatedStore {
        async fn contains(&self, _token: &str) -> NotaryResult<bool> {
            Ok(true)
        }
        async fn get(&self, _token: &str) -> NotaryResult<AccessTokenRecord> {
            Err(NotaryError::NotFound)
        }
        async fn add(&self, _token: &str, _record: &AccessTokenRecord) -> NotaryResult<()> {
            Ok(())
        }
        async fn insert_if_absent(
            &self,
            _token: &str,
            _record: &AccessTokenRecord,
        ) -> NotaryResult<bool> {
            Ok(false)
        }
        async fn remove(&self, _token: &str) -> NotaryResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_mint_gives_up_after_max_attempts() {
        let notary = Notary::builder(
            key(SigningAlgorithm::RS512),
            AuthorizationCodec::new(&CIPHER_KEY).unwrap(),
            Arc::new(SaturatedStore),
        )
        .max_mint_attempts(3)
        .build()
        .unwrap();

        let err = notary
            .mint_access_token(HOUR, 42, Scope::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NotaryError::Store { .. }));
        assert!(err.to_string().contains("3 attempts"));
    }

    #[test]
    fn test_sign_stamps_times_and_issuer() {
        let notary = notary();
        let before = now();

        let token = notary
            .sign_identity_token(
                IdentityClaims::new("", "client-1", "42").with_scope(Scope::from_iter(["openid"])),
            )
            .unwrap();
        let claims = notary.verify_identity_token(&token).unwrap();

        assert_eq!(claims.iss, "https://auth.example.com");
        assert!(claims.nbf >= before);
        assert_eq!(claims.iat, claims.nbf);
        assert_eq!(claims.exp - claims.nbf, 30 * 24 * 3600);
        assert!(claims.jti.is_some());
    }

    #[test]
    fn test_sign_keeps_caller_issuer() {
        let notary = notary();
        let token = notary
            .sign_identity_token(IdentityClaims::new("https://other", "client-1", "42"))
            .unwrap();
        assert_eq!(notary.verify_identity_token(&token).unwrap().iss, "https://other");
    }

    #[test]
    fn test_algorithm_pinning() {
        let rs512 = notary();
        let rs256 = Notary::builder(
            key(SigningAlgorithm::RS256),
            AuthorizationCodec::new(&CIPHER_KEY).unwrap(),
            Arc::new(MemoryTokenStore::new()),
        )
        .build()
        .unwrap();

        let token = rs256
            .sign_identity_token(IdentityClaims::new("", "client-1", "42"))
            .unwrap();
        assert!(matches!(
            rs512.verify_identity_token(&token),
            Err(NotaryError::Signature { .. })
        ));
    }

    #[test]
    fn test_zero_access_token_lifetime_rejected_at_build() {
        let result = Notary::builder(
            key(SigningAlgorithm::RS512),
            AuthorizationCodec::new(&CIPHER_KEY).unwrap(),
            Arc::new(MemoryTokenStore::new()),
        )
        .access_token_lifetime(Duration::from_millis(500))
        .build();
        assert!(matches!(result, Err(NotaryError::Configuration { .. })));
    }

    #[test]
    fn test_mismatched_key_pair_fails_at_construction() {
        let other = generate_pem_pair(SigningAlgorithm::ES384).unwrap();
        let mine = generate_pem_pair(SigningAlgorithm::ES384).unwrap();
        let key = SigningKeyPair::from_pem(
            "mixed",
            SigningAlgorithm::ES384,
            &mine.private_pem,
            &other.public_pem,
        )
        .unwrap();

        let result = Notary::builder(
            key,
            AuthorizationCodec::new(&CIPHER_KEY).unwrap(),
            Arc::new(MemoryTokenStore::new()),
        )
        .build();
        assert!(matches!(result, Err(NotaryError::Configuration { .. })));
    }

    #[test]
    fn test_authorization_code_delegation() {
        let notary = notary();
        let code = notary.mint_authorization_code(7, &[1, 2, 3], -9).unwrap();
        let decoded = notary.decipher_authorization_code(&code).unwrap();

        assert_eq!(decoded.client_id, 7);
        assert_eq!(decoded.scope_ids, vec![1, 2, 3]);
        assert_eq!(decoded.user_id, -9);

        assert!(matches!(
            notary.mint_authorization_code(7, &[0; 26], 1),
            Err(NotaryError::ScopeOverflow { .. })
        ));
    }

    #[test]
    fn test_jwks_and_debug() {
        let notary = notary();
        assert_eq!(notary.jwks().keys[0].kid, "test");

        let debug = format!("{notary:?}");
        assert!(debug.contains("RS512"));
        assert!(!debug.contains("PRIVATE"));
    }

    #[tokio::test]
    async fn test_close_releases_store() {
        let notary = notary();
        let token = notary
            .mint_access_token(HOUR, 1, Scope::new())
            .await
            .unwrap();
        notary.close().await;

        assert!(matches!(
            notary.verify_access_token(&token, 1, ["read"]).await,
            Err(NotaryError::Store { .. })
        ));
    }
}
