//! # notary-auth
//!
//! Credential core for an OAuth 2.0 style authorization service.
//!
//! This crate provides:
//! - Signed identity tokens (JWS, RSA or ECDSA) with JWKS export
//! - Opaque access tokens backed by a revocable, expiring registry
//! - Encrypted, checksummed authorization codes
//! - An authorization-code grant flow over pluggable client and user
//!   directories
//!
//! ## Overview
//!
//! Everything is issued through a [`Notary`], which owns the signing keys,
//! the code cipher and a [`TokenStore`] handle. Build one per process and
//! share it behind an `Arc`; it holds no mutable state of its own.
//!
//! ## Modules
//!
//! - [`config`] - Notary configuration
//! - [`error`] - Error taxonomy
//! - [`identity`] - Signing algorithms, key pairs and JWKs
//! - [`token`] - Identity tokens, access tokens and authorization codes
//! - [`storage`] - Access-token registry backends
//! - [`notary`] - The credential façade
//! - [`grant`] - Collaborator contracts and the code grant
//! - [`types`] - Scopes and claims

pub mod config;
pub mod error;
pub mod grant;
pub mod identity;
pub mod notary;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{
    CodeConfig, ConfigError, NotaryConfig, SigningConfig, TokenStoreConfig, TokenStoreKind,
};
pub use error::{ErrorCategory, NotaryError};
pub use grant::{
    ClientDirectory, ClientRecord, CodeReplayGuard, GrantFlow, MemoryReplayGuard, TokenGrant,
    UserDirectory, UserProfile,
};
pub use identity::{
    Jwk, Jwks, PemKeyPair, SigningAlgorithm, SigningKeyPair, generate_pem_pair, key_fingerprint,
};
pub use notary::{Notary, NotaryBuilder};
pub use storage::{MemoryTokenStore, RedisTokenStore, TokenStore, create_token_store};
pub use token::{
    AccessTokenRecord, AuthorizationCode, AuthorizationCodec, IdentitySigner, MAX_CODE_SCOPES,
};
pub use types::{ClientId, IdentityClaims, PermissionId, Scope, UserId};

/// Type alias for notary results.
pub type NotaryResult<T> = Result<T, NotaryError>;

/// Prelude module for convenient imports.
///
/// ```
/// use notary_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::NotaryResult;
    pub use crate::config::{ConfigError, NotaryConfig};
    pub use crate::error::{ErrorCategory, NotaryError};
    pub use crate::grant::{ClientDirectory, GrantFlow, TokenGrant, UserDirectory};
    pub use crate::notary::Notary;
    pub use crate::storage::TokenStore;
    pub use crate::types::{ClientId, IdentityClaims, PermissionId, Scope, UserId};
}
