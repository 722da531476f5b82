//! Redis-backed token store.
//!
//! Each token is stored as a JSON [`AccessTokenRecord`] under
//! `key_prefix + token`, with an absolute expiry (`EXPIREAT`) armed by the
//! same command or transaction that writes the value.

use std::fmt;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool, PoolConfig, Runtime};
use redis::AsyncCommands;
use time::OffsetDateTime;

use super::TokenStore;
use crate::NotaryResult;
use crate::config::TokenStoreConfig;
use crate::error::NotaryError;
use crate::token::{AccessTokenRecord, token_fingerprint};

impl From<redis::RedisError> for NotaryError {
    fn from(err: redis::RedisError) -> Self {
        NotaryError::store(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for NotaryError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        NotaryError::store(err.to_string())
    }
}

/// Token store shared by every notary instance pointing at the same Redis.
#[derive(Clone)]
pub struct RedisTokenStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisTokenStore {
    /// Wraps an existing connection pool.
    #[must_use]
    pub fn new(pool: Pool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
        }
    }

    /// Builds the connection pool described by `config`.
    ///
    /// No connection is opened until the first operation.
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::Configuration` if the pool cannot be created.
    pub fn from_config(config: &TokenStoreConfig) -> NotaryResult<Self> {
        let mut redis_config = deadpool_redis::Config::from_url(&config.uri);
        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(config.timeout());
        pool_config.timeouts.create = Some(config.timeout());
        pool_config.timeouts.recycle = Some(config.timeout());
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| NotaryError::configuration(format!("invalid token store: {e}")))?;

        Ok(Self::new(pool, config.key_prefix.clone()))
    }

    /// Builds the pool and checks that Redis answers.
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::Configuration` for a bad pool configuration, or
    /// `NotaryError::Store` if Redis cannot be reached.
    pub async fn connect(config: &TokenStoreConfig) -> NotaryResult<Self> {
        let store = Self::from_config(config)?;
        let mut conn = store.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        tracing::info!(
            pool_size = config.pool_size,
            key_prefix = %config.key_prefix,
            "connected to token store"
        );
        Ok(store)
    }

    fn key(&self, token: &str) -> String {
        format!("{}{}", self.key_prefix, token)
    }

    async fn connection(&self) -> NotaryResult<Connection> {
        self.pool.get().await.map_err(|e| {
            tracing::warn!(error = %e, "failed to get token store connection");
            NotaryError::from(e)
        })
    }

    fn encode(record: &AccessTokenRecord) -> NotaryResult<String> {
        serde_json::to_string(record)
            .map_err(|e| NotaryError::internal(format!("failed to encode token record: {e}")))
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn contains(&self, token: &str) -> NotaryResult<bool> {
        let mut conn = self.connection().await?;
        let exists: bool = conn.exists(self.key(token)).await?;
        Ok(exists)
    }

    async fn get(&self, token: &str) -> NotaryResult<AccessTokenRecord> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(self.key(token)).await?;
        let raw = raw.ok_or(NotaryError::NotFound)?;

        let record: AccessTokenRecord = serde_json::from_str(&raw).map_err(|e| {
            tracing::warn!(
                token = %token_fingerprint(token),
                error = %e,
                "corrupt access token record"
            );
            NotaryError::store(format!("corrupt access token record: {e}"))
        })?;

        // EXPIREAT is second-granular and lazily enforced; never hand out a
        // record past its expiry.
        if record.is_expired_at(OffsetDateTime::now_utc().unix_timestamp()) {
            return Err(NotaryError::NotFound);
        }
        Ok(record)
    }

    async fn add(&self, token: &str, record: &AccessTokenRecord) -> NotaryResult<()> {
        let key = self.key(token);
        let value = Self::encode(record)?;
        let mut conn = self.connection().await?;

        let _: () = redis::pipe()
            .atomic()
            .set(&key, value)
            .ignore()
            .expire_at(&key, record.expires_at)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn insert_if_absent(
        &self,
        token: &str,
        record: &AccessTokenRecord,
    ) -> NotaryResult<bool> {
        let value = Self::encode(record)?;
        let mut conn = self.connection().await?;

        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(token))
            .arg(value)
            .arg("NX")
            .arg("EXAT")
            .arg(record.expires_at)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn remove(&self, token: &str) -> NotaryResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(self.key(token)).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close();
        tracing::debug!("token store pool closed");
    }
}

impl fmt::Debug for RedisTokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.pool.status();
        f.debug_struct("RedisTokenStore")
            .field("key_prefix", &self.key_prefix)
            .field("max_size", &status.max_size)
            .field("size", &status.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_is_lazy() {
        // Nothing listens here; building the pool must still succeed.
        let config = TokenStoreConfig {
            uri: "redis://127.0.0.1:1/0".to_string(),
            ..TokenStoreConfig::default()
        };
        let store = RedisTokenStore::from_config(&config).unwrap();
        assert_eq!(store.key("abc"), "notary:access:abc");
    }

    #[test]
    fn test_from_config_rejects_bad_uri() {
        let config = TokenStoreConfig {
            uri: "not a url".to_string(),
            ..TokenStoreConfig::default()
        };
        assert!(matches!(
            RedisTokenStore::from_config(&config),
            Err(NotaryError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_redis_is_store_error() {
        let config = TokenStoreConfig {
            uri: "redis://127.0.0.1:1/0".to_string(),
            timeout_ms: 200,
            ..TokenStoreConfig::default()
        };
        let store = RedisTokenStore::from_config(&config).unwrap();
        assert!(matches!(
            store.contains("t").await,
            Err(NotaryError::Store { .. })
        ));
    }

    #[test]
    fn test_debug_hides_connection_details() {
        let config = TokenStoreConfig {
            uri: "redis://:secret@127.0.0.1:1/0".to_string(),
            ..TokenStoreConfig::default()
        };
        let store = RedisTokenStore::from_config(&config).unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("notary:access:"));
        assert!(!debug.contains("secret"));
    }
}
