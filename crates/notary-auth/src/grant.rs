//! Authorization-code grant around the notary.
//!
//! The notary itself never looks up clients or users. [`GrantFlow`] sequences
//! the two directory contracts around it:
//!
//! 1. **Authorization** ([`GrantFlow::issue_code`]): the user approves a
//!    client for a scope; the approved permissions are packed into an
//!    authorization code.
//! 2. **Exchange** ([`GrantFlow::exchange_code`]): the client authenticates,
//!    presents the code, and receives an access token (plus an identity token
//!    when `openid` was granted).
//!
//! Codes are stateless, so single use is enforced by an optional
//! [`CodeReplayGuard`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::NotaryResult;
use crate::error::NotaryError;
use crate::notary::Notary;
use crate::types::{ClientId, IdentityClaims, PermissionId, Scope, UserId};

/// Scope that requests an identity token alongside the access token.
pub const OPENID_SCOPE: &str = "openid";

// ============================================================================
// Collaborator contracts
// ============================================================================

/// A registered client application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    /// Internal numeric identifier, carried in authorization codes.
    pub id: ClientId,
    /// Public identifier, used as the identity-token audience.
    pub public_id: String,
    pub name: String,
}

/// Profile attributes copied into identity tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub picture: Option<String>,
    pub gender: Option<String>,
    pub zoneinfo: Option<String>,
    pub locale: Option<String>,
}

impl UserProfile {
    /// Copies the profile attributes onto `claims`.
    #[must_use]
    pub fn apply_to(self, mut claims: IdentityClaims) -> IdentityClaims {
        claims.name = self.name;
        claims.email = self.email;
        claims.email_verified = self.email_verified;
        claims.picture = self.picture;
        claims.gender = self.gender;
        claims.zoneinfo = self.zoneinfo;
        claims.locale = self.locale;
        claims
    }
}

/// Client registry consulted by the grant flow.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    /// Authenticates a client by its public identifier and secret, returning
    /// the canonical public identifier.
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::NotFound` for an unknown client or wrong secret.
    async fn authenticate_client(&self, public_id: &str, secret: &str) -> NotaryResult<String>;

    /// Looks up a client by its public identifier.
    async fn find_client(&self, public_id: &str) -> NotaryResult<Option<ClientRecord>>;

    /// Maps permission names to their numeric IDs, skipping unknown names.
    async fn scopes_to_permission_ids(&self, scope: &Scope) -> NotaryResult<Vec<PermissionId>>;

    /// Maps numeric permission IDs back to their names.
    async fn permission_ids_to_scopes(&self, ids: &[PermissionId]) -> NotaryResult<Scope>;
}

/// User registry consulted by the grant flow.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Authenticates a user by credential (login or e-mail) and password.
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::NotFound` for an unknown user or wrong password.
    async fn authenticate(&self, credential: &str, password: &str) -> NotaryResult<UserId>;

    /// Checks that the user allows `client_public_id` the given scope.
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::InsufficientScope` when the user has not granted
    /// the scope.
    async fn authorize_client(
        &self,
        user_id: UserId,
        client_public_id: &str,
        scope: &Scope,
    ) -> NotaryResult<()>;

    /// Returns the user's profile attributes.
    async fn profile(&self, user_id: UserId) -> NotaryResult<UserProfile>;
}

// ============================================================================
// Replay guard
// ============================================================================

/// Single-use enforcement for authorization codes.
#[async_trait]
pub trait CodeReplayGuard: Send + Sync {
    /// Records a code as used.
    ///
    /// # Returns
    ///
    /// Returns `true` the first time a code is presented within the guard's
    /// retention window, `false` on every later presentation.
    async fn first_use(&self, code: &str) -> NotaryResult<bool>;

    /// Hands a code back after an exchange that failed once the code was
    /// recorded, so the client can retry it.
    async fn release(&self, code: &str) -> NotaryResult<()>;
}

/// In-process replay guard remembering code digests for a fixed window.
#[derive(Debug)]
pub struct MemoryReplayGuard {
    seen: DashMap<[u8; 32], i64>,
    retention: Duration,
}

impl MemoryReplayGuard {
    /// Creates a guard that remembers each code for `retention`.
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            retention,
        }
    }

    /// Forgets codes whose retention window has passed.
    pub fn purge_expired(&self) -> usize {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let before = self.seen.len();
        self.seen.retain(|_, forget_at| *forget_at > now);
        before.saturating_sub(self.seen.len())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for MemoryReplayGuard {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

#[async_trait]
impl CodeReplayGuard for MemoryReplayGuard {
    async fn first_use(&self, code: &str) -> NotaryResult<bool> {
        let digest = code_digest(code);
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let retention = i64::try_from(self.retention.as_secs()).unwrap_or(i64::MAX);
        let forget_at = now.saturating_add(retention);

        match self.seen.entry(digest) {
            Entry::Occupied(mut entry) if *entry.get() <= now => {
                entry.insert(forget_at);
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(forget_at);
                Ok(true)
            }
        }
    }

    async fn release(&self, code: &str) -> NotaryResult<()> {
        self.seen.remove(&code_digest(code));
        Ok(())
    }
}

fn code_digest(code: &str) -> [u8; 32] {
    Sha256::digest(code.trim().as_bytes()).into()
}

// ============================================================================
// Grant flow
// ============================================================================

/// Successful code-exchange response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,

    /// Always `Bearer`.
    pub token_type: String,

    /// Access-token lifetime in seconds.
    pub expires_in: u64,

    /// Space-separated granted permissions.
    pub scope: String,

    /// Identity token, issued when `openid` was granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// Authorization-code grant.
pub struct GrantFlow {
    notary: Arc<Notary>,
    clients: Arc<dyn ClientDirectory>,
    users: Arc<dyn UserDirectory>,
    replay_guard: Option<Arc<dyn CodeReplayGuard>>,
    access_token_lifetime: Duration,
}

impl GrantFlow {
    /// Creates a grant flow issuing access tokens for the notary's
    /// configured access-token lifetime.
    #[must_use]
    pub fn new(
        notary: Arc<Notary>,
        clients: Arc<dyn ClientDirectory>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            access_token_lifetime: notary.access_token_lifetime(),
            notary,
            clients,
            users,
            replay_guard: None,
        }
    }

    /// Enforces single use of authorization codes.
    #[must_use]
    pub fn with_replay_guard(mut self, guard: Arc<dyn CodeReplayGuard>) -> Self {
        self.replay_guard = Some(guard);
        self
    }

    /// Sets the lifetime of access tokens issued on exchange.
    #[must_use]
    pub fn with_access_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.access_token_lifetime = lifetime;
        self
    }

    /// Issues an authorization code once `user_id` has approved
    /// `client_public_id` for `scope`.
    ///
    /// # Errors
    ///
    /// - `NotaryError::NotFound` if the client is unknown
    /// - `NotaryError::InsufficientScope` if the user did not approve the
    ///   scope, or none of its permissions is known
    /// - `NotaryError::ScopeOverflow` if more than 25 permissions map through
    pub async fn issue_code(
        &self,
        user_id: UserId,
        client_public_id: &str,
        scope: &Scope,
    ) -> NotaryResult<String> {
        // 1. Resolve the client
        let client = self
            .clients
            .find_client(client_public_id)
            .await?
            .ok_or(NotaryError::NotFound)?;

        // 2. The user must have approved this client for the scope
        self.users
            .authorize_client(user_id, &client.public_id, scope)
            .await?;

        // 3. Map names to the IDs carried in the code
        let scope_ids = self.clients.scopes_to_permission_ids(scope).await?;
        if scope_ids.is_empty() {
            return Err(NotaryError::insufficient_scope(scope.iter()));
        }

        let code = self
            .notary
            .mint_authorization_code(client.id, &scope_ids, user_id)?;

        tracing::debug!(
            client_id = client.id,
            user_id,
            permissions = scope_ids.len(),
            "authorization code issued"
        );
        Ok(code)
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// - `NotaryError::NotFound` if the client fails to authenticate
    /// - `NotaryError::InvalidCode` if the code is invalid, was issued to
    ///   another client, or was already used
    /// - `NotaryError::Store` if the access token cannot be registered; the
    ///   code stays usable, so the whole exchange can be retried
    pub async fn exchange_code(
        &self,
        client_public_id: &str,
        secret: &str,
        code: &str,
        nonce: Option<&str>,
    ) -> NotaryResult<TokenGrant> {
        // 1. Authenticate the client
        let public_id = self
            .clients
            .authenticate_client(client_public_id, secret)
            .await?;
        let client = self
            .clients
            .find_client(&public_id)
            .await?
            .ok_or(NotaryError::NotFound)?;

        // 2. Decipher and bind the code to this client
        let grant = self.notary.decipher_authorization_code(code)?;
        if grant.client_id != client.id {
            tracing::debug!(
                client_id = client.id,
                code_client_id = grant.client_id,
                "authorization code presented by another client"
            );
            return Err(NotaryError::InvalidCode);
        }

        // 3. Resolve everything fallible before the code is spent
        let scope = self
            .clients
            .permission_ids_to_scopes(&grant.scope_ids)
            .await?;
        let id_claims = if scope.contains(OPENID_SCOPE) {
            let profile = self.users.profile(grant.user_id).await?;
            let mut claims = profile.apply_to(
                IdentityClaims::new(
                    self.notary.issuer(),
                    &client.public_id,
                    grant.user_id.to_string(),
                )
                .with_scope(scope.clone()),
            );
            claims.nonce = nonce.map(str::to_string);
            Some(claims)
        } else {
            None
        };

        // 4. Single use
        if let Some(guard) = &self.replay_guard
            && !guard.first_use(code).await?
        {
            tracing::warn!(client_id = client.id, "authorization code replayed");
            return Err(NotaryError::InvalidCode);
        }

        // 5. Issue tokens; on failure the code goes back to the guard
        let (access_token, id_token) = match self
            .issue_tokens(grant.user_id, &scope, id_claims)
            .await
        {
            Ok(tokens) => tokens,
            Err(err) => {
                if let Some(guard) = &self.replay_guard
                    && let Err(release_err) = guard.release(code).await
                {
                    tracing::warn!(
                        client_id = client.id,
                        error = %release_err,
                        "failed to release authorization code"
                    );
                }
                return Err(err);
            }
        };

        Ok(TokenGrant {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_lifetime.as_secs(),
            scope: scope.to_string(),
            id_token,
        })
    }

    /// Mints the access token and signs the identity token. Revokes the
    /// access token again if signing fails.
    async fn issue_tokens(
        &self,
        user_id: UserId,
        scope: &Scope,
        id_claims: Option<IdentityClaims>,
    ) -> NotaryResult<(String, Option<String>)> {
        let access_token = self
            .notary
            .mint_access_token(self.access_token_lifetime, user_id, scope.clone())
            .await?;

        let Some(claims) = id_claims else {
            return Ok((access_token, None));
        };

        match self.notary.sign_identity_token(claims) {
            Ok(id_token) => Ok((access_token, Some(id_token))),
            Err(err) => {
                if let Err(revoke_err) = self.notary.revoke_access_token(&access_token).await {
                    tracing::warn!(
                        user_id,
                        error = %revoke_err,
                        "failed to revoke access token of a failed exchange"
                    );
                }
                Err(err)
            }
        }
    }

    /// Returns the notary this flow issues through.
    #[must_use]
    pub fn notary(&self) -> &Arc<Notary> {
        &self.notary
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::identity::{PemKeyPair, SigningAlgorithm, SigningKeyPair, generate_pem_pair};
    use crate::storage::{MemoryTokenStore, TokenStore};
    use crate::token::{AccessTokenRecord, AuthorizationCodec};

    fn pem() -> &'static PemKeyPair {
        static PEM: OnceLock<PemKeyPair> = OnceLock::new();
        PEM.get_or_init(|| generate_pem_pair(SigningAlgorithm::ES384).unwrap())
    }

    fn notary() -> Arc<Notary> {
        notary_with(Arc::new(MemoryTokenStore::new()), Duration::from_secs(3600))
    }

    fn notary_with(store: Arc<dyn TokenStore>, access_token_lifetime: Duration) -> Arc<Notary> {
        let pem = pem();
        let key = SigningKeyPair::from_pem(
            "grant-test",
            SigningAlgorithm::ES384,
            &pem.private_pem,
            &pem.public_pem,
        )
        .unwrap();
        Arc::new(
            Notary::builder(
                key,
                AuthorizationCodec::new(&[3; 16]).unwrap(),
                store,
            )
            .issuer("https://auth.example.com")
            .access_token_lifetime(access_token_lifetime)
            .build()
            .unwrap(),
        )
    }

    struct Clients {
        clients: Vec<(ClientRecord, &'static str)>,
        permissions: HashMap<&'static str, PermissionId>,
    }

    impl Clients {
        fn new() -> Self {
            Self {
                clients: vec![
                    (
                        ClientRecord {
                            id: 1,
                            public_id: "app".to_string(),
                            name: "App".to_string(),
                        },
                        "app-secret",
                    ),
                    (
                        ClientRecord {
                            id: 2,
                            public_id: "other".to_string(),
                            name: "Other".to_string(),
                        },
                        "other-secret",
                    ),
                ],
                permissions: HashMap::from([("openid", 1), ("read", 2), ("write", 3)]),
            }
        }
    }

    #[async_trait]
    impl ClientDirectory for Clients {
        async fn authenticate_client(&self, public_id: &str, secret: &str) -> NotaryResult<String> {
            self.clients
                .iter()
                .find(|(client, s)| client.public_id == public_id && *s == secret)
                .map(|(client, _)| client.public_id.clone())
                .ok_or(NotaryError::NotFound)
        }

        async fn find_client(&self, public_id: &str) -> NotaryResult<Option<ClientRecord>> {
            Ok(self
                .clients
                .iter()
                .find(|(client, _)| client.public_id == public_id)
                .map(|(client, _)| client.clone()))
        }

        async fn scopes_to_permission_ids(
            &self,
            scope: &Scope,
        ) -> NotaryResult<Vec<PermissionId>> {
            Ok(scope
                .iter()
                .filter_map(|name| self.permissions.get(name).copied())
                .collect())
        }

        async fn permission_ids_to_scopes(&self, ids: &[PermissionId]) -> NotaryResult<Scope> {
            Ok(ids
                .iter()
                .filter_map(|id| {
                    self.permissions
                        .iter()
                        .find(|(_, pid)| *pid == id)
                        .map(|(name, _)| *name)
                })
                .collect())
        }
    }

    /// Fails the first `insert_if_absent` calls with a transient error.
    struct FlakyStore {
        inner: MemoryTokenStore,
        failures_left: AtomicU32,
    }

    impl FlakyStore {
        fn failing(times: u32) -> Self {
            Self {
                inner: MemoryTokenStore::new(),
                failures_left: AtomicU32::new(times),
            }
        }
    }

    #[async_trait]
    impl TokenStore for FlakyStore {
        async fn contains(&self, token: &str) -> NotaryResult<bool> {
            self.inner.contains(token).await
        }

        async fn get(&self, token: &str) -> NotaryResult<AccessTokenRecord> {
            self.inner.get(token).await
        }

        async fn add(&self, token: &str, record: &AccessTokenRecord) -> NotaryResult<()> {
            self.inner.add(token, record).await
        }

        async fn insert_if_absent(
            &self,
            token: &str,
            record: &AccessTokenRecord,
        ) -> NotaryResult<bool> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(NotaryError::store("transient"));
            }
            self.inner.insert_if_absent(token, record).await
        }

        async fn remove(&self, token: &str) -> NotaryResult<()> {
            self.inner.remove(token).await
        }
    }

    #[derive(Default)]
    struct Users {
        profile_failures: AtomicU32,
    }

    impl Users {
        fn failing_profile(times: u32) -> Self {
            Self {
                profile_failures: AtomicU32::new(times),
            }
        }
    }

    #[async_trait]
    impl UserDirectory for Users {
        async fn authenticate(&self, credential: &str, password: &str) -> NotaryResult<UserId> {
            match (credential, password) {
                ("ana", "hunter2") => Ok(42),
                _ => Err(NotaryError::NotFound),
            }
        }

        async fn authorize_client(
            &self,
            _user_id: UserId,
            client_public_id: &str,
            scope: &Scope,
        ) -> NotaryResult<()> {
            if client_public_id == "app" && !scope.contains("write") {
                Ok(())
            } else {
                Err(NotaryError::insufficient_scope(scope.iter()))
            }
        }

        async fn profile(&self, _user_id: UserId) -> NotaryResult<UserProfile> {
            if self
                .profile_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(NotaryError::store("profile backend unavailable"));
            }
            Ok(UserProfile {
                name: Some("Ana".to_string()),
                email: Some("ana@example.com".to_string()),
                email_verified: Some(true),
                ..UserProfile::default()
            })
        }
    }

    fn flow() -> GrantFlow {
        GrantFlow::new(notary(), Arc::new(Clients::new()), Arc::new(Users::default()))
            .with_replay_guard(Arc::new(MemoryReplayGuard::default()))
    }

    #[tokio::test]
    async fn test_full_grant_with_openid() {
        let flow = flow();
        let user_id = Users::default()
            .authenticate("ana", "hunter2")
            .await
            .unwrap();
        let scope: Scope = "openid read".parse().unwrap();

        let code = flow.issue_code(user_id, "app", &scope).await.unwrap();
        let grant = flow
            .exchange_code("app", "app-secret", &code, Some("n-0S6"))
            .await
            .unwrap();

        assert_eq!(grant.token_type, "Bearer");
        assert_eq!(grant.expires_in, 3600);
        assert_eq!(grant.scope, "openid read");

        flow.notary()
            .verify_access_token(&grant.access_token, 42, ["read"])
            .await
            .unwrap();

        let id_token = grant.id_token.unwrap();
        let claims = flow.notary().verify_identity_token(&id_token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.aud, "app");
        assert_eq!(claims.iss, "https://auth.example.com");
        assert_eq!(claims.nonce.as_deref(), Some("n-0S6"));
        assert_eq!(claims.email.as_deref(), Some("ana@example.com"));
        assert!(claims.contains_scope(["openid", "read"]));
    }

    #[tokio::test]
    async fn test_no_id_token_without_openid() {
        let flow = flow();
        let code = flow
            .issue_code(42, "app", &Scope::from_iter(["read"]))
            .await
            .unwrap();
        let grant = flow
            .exchange_code("app", "app-secret", &code, None)
            .await
            .unwrap();

        assert!(grant.id_token.is_none());
        let json = serde_json::to_value(&grant).unwrap();
        assert!(json.get("id_token").is_none());
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let flow = flow();
        let code = flow
            .issue_code(42, "app", &Scope::from_iter(["read"]))
            .await
            .unwrap();

        flow.exchange_code("app", "app-secret", &code, None)
            .await
            .unwrap();
        assert!(matches!(
            flow.exchange_code("app", "app-secret", &code, None).await,
            Err(NotaryError::InvalidCode)
        ));
    }

    #[tokio::test]
    async fn test_code_bound_to_client() {
        let flow = flow();
        let code = flow
            .issue_code(42, "app", &Scope::from_iter(["read"]))
            .await
            .unwrap();

        assert!(matches!(
            flow.exchange_code("other", "other-secret", &code, None).await,
            Err(NotaryError::InvalidCode)
        ));
        // The rejected attempt did not burn the code.
        assert!(
            flow.exchange_code("app", "app-secret", &code, None)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_wrong_secret() {
        let flow = flow();
        let code = flow
            .issue_code(42, "app", &Scope::from_iter(["read"]))
            .await
            .unwrap();

        assert!(matches!(
            flow.exchange_code("app", "wrong", &code, None).await,
            Err(NotaryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_issue_code_rejections() {
        let flow = flow();

        assert!(matches!(
            flow.issue_code(42, "ghost", &Scope::from_iter(["read"])).await,
            Err(NotaryError::NotFound)
        ));
        assert!(matches!(
            flow.issue_code(42, "app", &Scope::from_iter(["read", "write"])).await,
            Err(NotaryError::InsufficientScope { .. })
        ));
        assert!(matches!(
            flow.issue_code(42, "app", &Scope::from_iter(["unknown"])).await,
            Err(NotaryError::InsufficientScope { .. })
        ));
    }

    #[tokio::test]
    async fn test_replay_guard_window() {
        let guard = MemoryReplayGuard::new(Duration::from_secs(60));
        assert!(guard.first_use("code-a").await.unwrap());
        assert!(!guard.first_use("code-a").await.unwrap());
        assert!(!guard.first_use(" code-a ").await.unwrap());
        assert!(guard.first_use("code-b").await.unwrap());
        assert_eq!(guard.len(), 2);
        assert_eq!(guard.purge_expired(), 0);

        // A zero window forgets codes immediately.
        let forgetful = MemoryReplayGuard::new(Duration::ZERO);
        assert!(forgetful.first_use("code-a").await.unwrap());
        assert_eq!(forgetful.purge_expired(), 1);
        assert!(forgetful.is_empty());
    }

    #[tokio::test]
    async fn test_store_error_leaves_code_usable() {
        let flow = GrantFlow::new(
            notary_with(Arc::new(FlakyStore::failing(1)), Duration::from_secs(3600)),
            Arc::new(Clients::new()),
            Arc::new(Users::default()),
        )
        .with_replay_guard(Arc::new(MemoryReplayGuard::default()));
        let code = flow
            .issue_code(42, "app", &Scope::from_iter(["read"]))
            .await
            .unwrap();

        let first = flow.exchange_code("app", "app-secret", &code, None).await;
        assert!(matches!(first, Err(NotaryError::Store { .. })));

        let retry = flow
            .exchange_code("app", "app-secret", &code, None)
            .await
            .unwrap();
        flow.notary()
            .verify_access_token(&retry.access_token, 42, ["read"])
            .await
            .unwrap();

        // Once exchanged, the code is spent.
        assert!(matches!(
            flow.exchange_code("app", "app-secret", &code, None).await,
            Err(NotaryError::InvalidCode)
        ));
    }

    #[tokio::test]
    async fn test_profile_error_leaves_code_usable() {
        let store = Arc::new(MemoryTokenStore::new());
        let flow = GrantFlow::new(
            notary_with(store.clone(), Duration::from_secs(3600)),
            Arc::new(Clients::new()),
            Arc::new(Users::failing_profile(1)),
        )
        .with_replay_guard(Arc::new(MemoryReplayGuard::default()));
        let code = flow
            .issue_code(42, "app", &Scope::from_iter(["openid", "read"]))
            .await
            .unwrap();

        assert!(matches!(
            flow.exchange_code("app", "app-secret", &code, None).await,
            Err(NotaryError::Store { .. })
        ));
        // No access token was left behind by the failed attempt.
        assert!(store.is_empty());

        let grant = flow
            .exchange_code("app", "app-secret", &code, None)
            .await
            .unwrap();
        assert!(grant.id_token.is_some());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_configured_access_token_lifetime() {
        let store = Arc::new(MemoryTokenStore::new());
        let flow = GrantFlow::new(
            notary_with(store.clone(), Duration::from_secs(900)),
            Arc::new(Clients::new()),
            Arc::new(Users::default()),
        );
        let code = flow
            .issue_code(42, "app", &Scope::from_iter(["read"]))
            .await
            .unwrap();

        let before = OffsetDateTime::now_utc().unix_timestamp();
        let grant = flow
            .exchange_code("app", "app-secret", &code, None)
            .await
            .unwrap();
        let after = OffsetDateTime::now_utc().unix_timestamp();

        assert_eq!(grant.expires_in, 900);
        let record = store.get(&grant.access_token).await.unwrap();
        assert!(record.expires_at >= before + 900 && record.expires_at <= after + 900);
    }

    #[tokio::test]
    async fn test_replay_guard_release() {
        let guard = MemoryReplayGuard::default();
        assert!(guard.first_use("code-a").await.unwrap());
        guard.release(" code-a").await.unwrap();
        assert!(guard.is_empty());
        assert!(guard.first_use("code-a").await.unwrap());

        // Releasing an unknown code is a no-op.
        guard.release("code-b").await.unwrap();
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn test_profile_apply_to() {
        let claims = UserProfile {
            locale: Some("pt-BR".to_string()),
            ..UserProfile::default()
        }
        .apply_to(IdentityClaims::new("iss", "aud", "1"));

        assert_eq!(claims.locale.as_deref(), Some("pt-BR"));
        assert!(claims.email.is_none());
        assert_eq!(claims.sub, "1");
    }
}
