//! Process-local token store.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;

use super::TokenStore;
use crate::NotaryResult;
use crate::error::NotaryError;
use crate::token::AccessTokenRecord;

/// Token store backed by a concurrent hash map.
///
/// Expired records are treated as absent on every read and are dropped lazily;
/// [`MemoryTokenStore::purge_expired`] reclaims them eagerly.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: DashMap<String, AccessTokenRecord>,
    closed: AtomicBool,
}

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

impl MemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Drops every expired record, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = now();
        let before = self.tokens.len();
        self.tokens.retain(|_, record| !record.is_expired_at(now));
        let purged = before.saturating_sub(self.tokens.len());
        if purged > 0 {
            tracing::debug!(purged, "purged expired access tokens");
        }
        purged
    }

    fn ensure_open(&self) -> NotaryResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NotaryError::store("token store is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn contains(&self, token: &str) -> NotaryResult<bool> {
        self.ensure_open()?;
        let now = now();
        Ok(self
            .tokens
            .get(token)
            .is_some_and(|record| !record.is_expired_at(now)))
    }

    async fn get(&self, token: &str) -> NotaryResult<AccessTokenRecord> {
        self.ensure_open()?;
        let now = now();
        match self.tokens.get(token) {
            Some(record) if !record.is_expired_at(now) => Ok(record.clone()),
            Some(record) => {
                drop(record);
                self.tokens
                    .remove_if(token, |_, record| record.is_expired_at(now));
                Err(NotaryError::NotFound)
            }
            None => Err(NotaryError::NotFound),
        }
    }

    async fn add(&self, token: &str, record: &AccessTokenRecord) -> NotaryResult<()> {
        self.ensure_open()?;
        self.tokens.insert(token.to_string(), record.clone());
        Ok(())
    }

    async fn insert_if_absent(
        &self,
        token: &str,
        record: &AccessTokenRecord,
    ) -> NotaryResult<bool> {
        self.ensure_open()?;
        let now = now();
        match self.tokens.entry(token.to_string()) {
            Entry::Occupied(mut existing) => {
                if existing.get().is_expired_at(now) {
                    existing.insert(record.clone());
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }

    async fn remove(&self, token: &str) -> NotaryResult<()> {
        self.ensure_open()?;
        self.tokens.remove(token);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.tokens.clear();
    }
}
