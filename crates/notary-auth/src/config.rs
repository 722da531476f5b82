//! Notary configuration.
//!
//! The notary consumes already-materialised key material and connection
//! settings; loading them from files and the environment is the binary's job.
//!
//! # Example (TOML)
//!
//! ```toml
//! issuer = "https://auth.example.com"
//! id_token_lifetime = "30d"
//!
//! [signing]
//! algorithm = "RS512"
//! private_key_file = "/etc/notary/private.pem"
//! public_key_file = "/etc/notary/public.pem"
//!
//! [code]
//! cipher_key = "000102030405060708090a0b0c0d0e0f"
//!
//! [token_store]
//! store_type = "redis"
//! uri = "redis://127.0.0.1:6379/1"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::NotaryError;
use crate::identity::SigningAlgorithm;

/// Root notary configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotaryConfig {
    /// Issuer URL, stamped into identity tokens that do not carry one.
    pub issuer: String,

    /// Validity window of identity tokens.
    #[serde(with = "humantime_serde")]
    pub id_token_lifetime: Duration,

    /// Validity window of access tokens issued by the grant flow.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Candidates tried before minting gives up with a store error.
    pub max_mint_attempts: u32,

    /// Identity-token signing keys.
    pub signing: SigningConfig,

    /// Authorization-code cipher.
    pub code: CodeConfig,

    /// Access-token registry.
    pub token_store: TokenStoreConfig,
}

impl Default for NotaryConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            id_token_lifetime: Duration::from_secs(30 * 24 * 3600), // 30 days
            access_token_lifetime: Duration::from_secs(3600),       // 1 hour
            max_mint_attempts: 8,
            signing: SigningConfig::default(),
            code: CodeConfig::default(),
            token_store: TokenStoreConfig::default(),
        }
    }
}

/// Identity-token signing configuration.
///
/// Each key may be given inline (`*_pem`) or as a file path (`*_file`); the
/// inline value wins when both are set.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Signing algorithm.
    /// Supported: "RS256", "RS384", "RS512", "ES384"
    pub algorithm: String,

    /// Key ID published in token headers and the JWKS.
    /// Derived from the public key when unset.
    pub key_id: Option<String>,

    pub private_key_pem: Option<String>,
    pub private_key_file: Option<PathBuf>,
    pub public_key_pem: Option<String>,
    pub public_key_file: Option<PathBuf>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: "RS512".to_string(),
            key_id: None,
            private_key_pem: None,
            private_key_file: None,
            public_key_pem: None,
            public_key_file: None,
        }
    }
}

impl SigningConfig {
    /// Parses the configured algorithm.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for an unsupported algorithm.
    pub fn algorithm(&self) -> Result<SigningAlgorithm, ConfigError> {
        self.algorithm.parse().map_err(|_| {
            ConfigError::InvalidValue(format!(
                "Invalid signing algorithm: '{}'. Must be RS256, RS384, RS512, or ES384",
                self.algorithm
            ))
        })
    }

    /// Returns the private key PEM, reading it from disk if configured as a file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if neither form is set, or
    /// `ConfigError::Io` if the file cannot be read.
    pub fn private_key(&self) -> Result<String, ConfigError> {
        resolve_pem(
            "signing.private_key",
            self.private_key_pem.as_deref(),
            self.private_key_file.as_deref(),
        )
    }

    /// Returns the public key PEM, reading it from disk if configured as a file.
    ///
    /// # Errors
    ///
    /// Same as [`SigningConfig::private_key`].
    pub fn public_key(&self) -> Result<String, ConfigError> {
        resolve_pem(
            "signing.public_key",
            self.public_key_pem.as_deref(),
            self.public_key_file.as_deref(),
        )
    }

    fn has_private_key(&self) -> bool {
        self.private_key_pem.is_some() || self.private_key_file.is_some()
    }

    fn has_public_key(&self) -> bool {
        self.public_key_pem.is_some() || self.public_key_file.is_some()
    }
}

fn resolve_pem(name: &str, inline: Option<&str>, file: Option<&Path>) -> Result<String, ConfigError> {
    if let Some(pem) = inline {
        return Ok(pem.to_string());
    }
    let path = file.ok_or_else(|| ConfigError::Missing(format!("{name}_pem or {name}_file")))?;
    std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))
}

/// Authorization-code cipher configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CodeConfig {
    /// Hex-encoded AES key (32, 48 or 64 hex digits).
    pub cipher_key: Option<String>,
}

impl CodeConfig {
    /// Decodes the cipher key.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` when unset, `ConfigError::InvalidValue`
    /// when not hex or not 16/24/32 bytes long.
    pub fn cipher_key(&self) -> Result<Vec<u8>, ConfigError> {
        let hex_key = self
            .cipher_key
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("code.cipher_key".to_string()))?;
        let key = hex::decode(hex_key.trim()).map_err(|e| {
            ConfigError::InvalidValue(format!("code.cipher_key is not valid hex: {e}"))
        })?;
        match key.len() {
            16 | 24 | 32 => Ok(key),
            other => Err(ConfigError::InvalidValue(format!(
                "code.cipher_key must be 16, 24 or 32 bytes, got {other}"
            ))),
        }
    }
}

/// Token store backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStoreKind {
    Redis,
    Memory,
}

/// Access-token registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenStoreConfig {
    /// Backend: "redis" or "memory".
    pub store_type: String,

    /// Redis connection URI.
    pub uri: String,

    /// Maximum pooled connections.
    pub pool_size: usize,

    /// Pool checkout and connect timeout in milliseconds.
    pub timeout_ms: u64,

    /// Prefix prepended to every token key.
    pub key_prefix: String,
}

impl Default for TokenStoreConfig {
    fn default() -> Self {
        Self {
            store_type: "redis".to_string(),
            uri: "redis://127.0.0.1:6379/1".to_string(),
            pool_size: 10,
            timeout_ms: 5000,
            key_prefix: "notary:access:".to_string(),
        }
    }
}

impl TokenStoreConfig {
    /// In-memory store settings, for tests and single-process tools.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            store_type: "memory".to_string(),
            ..Self::default()
        }
    }

    /// Parses the backend selector.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for an unknown backend.
    pub fn kind(&self) -> Result<TokenStoreKind, ConfigError> {
        match self.store_type.to_ascii_lowercase().as_str() {
            "redis" => Ok(TokenStoreKind::Redis),
            "memory" => Ok(TokenStoreKind::Memory),
            other => Err(ConfigError::InvalidValue(format!(
                "Invalid token store type: '{other}'. Must be redis or memory"
            ))),
        }
    }

    /// Pool timeout as a duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// A referenced file could not be read.
    #[error("Failed to read configuration file: {0}")]
    Io(String),
}

impl From<ConfigError> for NotaryError {
    fn from(err: ConfigError) -> Self {
        NotaryError::configuration(err.to_string())
    }
}

impl NotaryConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The issuer is empty
    /// - The signing algorithm is not supported
    /// - The cipher key is not hex or has the wrong length
    /// - The token store type is unknown
    /// - The pool size or mint attempt limit is zero
    ///
    /// Returns `ConfigError::Missing` if key material is absent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::InvalidValue(
                "issuer cannot be empty".to_string(),
            ));
        }

        if self.max_mint_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "max_mint_attempts must be > 0".to_string(),
            ));
        }

        if self.id_token_lifetime.is_zero() || self.access_token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "token lifetimes must be > 0".to_string(),
            ));
        }

        self.signing.algorithm()?;
        if !self.signing.has_private_key() {
            return Err(ConfigError::Missing(
                "signing.private_key_pem or signing.private_key_file".to_string(),
            ));
        }
        if !self.signing.has_public_key() {
            return Err(ConfigError::Missing(
                "signing.public_key_pem or signing.public_key_file".to_string(),
            ));
        }

        self.code.cipher_key()?;

        if self.token_store.kind()? == TokenStoreKind::Redis {
            if self.token_store.uri.is_empty() {
                return Err(ConfigError::Missing("token_store.uri".to_string()));
            }
            if self.token_store.pool_size == 0 {
                return Err(ConfigError::InvalidValue(
                    "token_store.pool_size must be > 0".to_string(),
                ));
            }
        }

        Ok(())
    }
}
