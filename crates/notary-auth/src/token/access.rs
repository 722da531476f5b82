//! Opaque access tokens.
//!
//! An access token is 33 raw bytes rendered with standard base64. The bytes
//! are built from an 8-byte big-endian issuance timestamp followed by 25 bytes
//! from the OS random source; the first 32 bytes are then replaced by the
//! SHA-256 of the whole buffer. The last byte keeps its random value, so two
//! tokens minted in the same second still differ in their suffix.
//!
//! The token itself means nothing: its state lives in the
//! [`TokenStore`](crate::storage::TokenStore) as an [`AccessTokenRecord`].

use base64::{Engine, engine::general_purpose::STANDARD};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{Scope, UserId};

/// Raw length of an access token.
pub const ACCESS_TOKEN_LEN: usize = 33;

const TIMESTAMP_LEN: usize = 8;
const DIGEST_LEN: usize = 32;

/// State of an access token, owned by the token store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenRecord {
    /// User the token was issued to.
    #[serde(rename = "uid")]
    pub user_id: UserId,

    /// Permissions granted with the token.
    pub scope: Scope,

    /// Absolute expiry (Unix timestamp).
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

impl AccessTokenRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(user_id: UserId, scope: Scope, expires_at: i64) -> Self {
        Self {
            user_id,
            scope,
            expires_at,
        }
    }

    /// Returns `true` if the record has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Generates a candidate access token for the given issuance time.
#[must_use]
pub fn generate_access_token(issued_at: i64) -> String {
    let mut bytes = [0u8; ACCESS_TOKEN_LEN];
    bytes[..TIMESTAMP_LEN].copy_from_slice(&issued_at.to_be_bytes());
    OsRng.fill_bytes(&mut bytes[TIMESTAMP_LEN..]);

    let digest = Sha256::digest(bytes);
    bytes[..DIGEST_LEN].copy_from_slice(&digest);

    STANDARD.encode(bytes)
}

/// Short, non-reversible fingerprint of a token for log correlation.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..4])
}
