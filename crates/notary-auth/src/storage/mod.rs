//! Access-token registry.
//!
//! Opaque access tokens carry no state of their own; the registry maps each
//! token to an [`AccessTokenRecord`] and expires it at the record's absolute
//! expiry time. A token that has expired or been removed is simply absent.
//!
//! # Implementations
//!
//! - [`RedisTokenStore`] - shared registry backed by a pooled Redis connection
//! - [`MemoryTokenStore`] - process-local registry for tests and tools

pub mod memory;
pub mod redis_store;

use std::sync::Arc;

use async_trait::async_trait;

use crate::NotaryResult;
use crate::config::{TokenStoreConfig, TokenStoreKind};
use crate::token::AccessTokenRecord;

pub use memory::MemoryTokenStore;
pub use redis_store::RedisTokenStore;

/// Storage trait for opaque access tokens.
///
/// Every write arms the record's expiry together with its value: an entry
/// without an expiry must never be observable.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Returns `true` if the token is registered and not expired.
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::Store` if the backend fails.
    async fn contains(&self, token: &str) -> NotaryResult<bool>;

    /// Looks up a token.
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::NotFound` if the token is absent or expired, or
    /// `NotaryError::Store` if the backend fails.
    async fn get(&self, token: &str) -> NotaryResult<AccessTokenRecord>;

    /// Registers a token, overwriting any existing record.
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::Store` if the backend fails.
    async fn add(&self, token: &str, record: &AccessTokenRecord) -> NotaryResult<()>;

    /// Atomically registers a token unless it is already present.
    ///
    /// # Returns
    ///
    /// Returns `true` if the record was inserted, or `false` if the token was
    /// already registered (the existing record is left untouched).
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::Store` if the backend fails.
    async fn insert_if_absent(&self, token: &str, record: &AccessTokenRecord)
    -> NotaryResult<bool>;

    /// Deletes a token. Removing an absent token is not an error.
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::Store` if the backend fails.
    async fn remove(&self, token: &str) -> NotaryResult<()>;

    /// Releases backend resources. Calls made after closing fail.
    async fn close(&self) {}
}

/// Builds the token store selected by `config`, checking that a remote
/// backend answers before returning it.
///
/// # Errors
///
/// Returns `NotaryError::Configuration` for an unknown backend or an invalid
/// connection URI, and `NotaryError::Store` if Redis cannot be reached.
pub async fn create_token_store(config: &TokenStoreConfig) -> NotaryResult<Arc<dyn TokenStore>> {
    match config.kind()? {
        TokenStoreKind::Memory => Ok(Arc::new(MemoryTokenStore::new())),
        TokenStoreKind::Redis => Ok(Arc::new(RedisTokenStore::connect(config).await?)),
    }
}
