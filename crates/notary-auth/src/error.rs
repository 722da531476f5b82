//! Credential error types.
//!
//! Every fallible notary operation returns [`NotaryError`]. The variants follow
//! how a failure is surfaced to a caller: authentication failures collapse into
//! "unauthorized", authorization failures into "forbidden", and authorization
//! code failures into a single generic rejection that never says which check
//! failed.

use std::fmt;

/// Errors that can occur while issuing, verifying or revoking credentials.
#[derive(Debug, thiserror::Error)]
pub enum NotaryError {
    /// The identity token signature is forged, or its header declares an
    /// algorithm other than the configured one.
    #[error("Invalid signature: {message}")]
    Signature {
        /// Description of the signature failure.
        message: String,
    },

    /// The identity token could not be parsed.
    #[error("Malformed token: {message}")]
    MalformedToken {
        /// Description of the parse failure.
        message: String,
    },

    /// The current time falls outside the token's validity window.
    #[error("Token expired")]
    Expired,

    /// The access token is absent, expired or revoked.
    #[error("Token not found")]
    NotFound,

    /// The access token belongs to a different user.
    #[error("Token was not issued to this user")]
    IdentityMismatch,

    /// The access token's scope does not cover the requested permissions.
    #[error("Insufficient scope: {required}")]
    InsufficientScope {
        /// Space-separated permissions that were requested.
        required: String,
    },

    /// The authorization code is malformed, tampered with, or was produced
    /// under another key.
    #[error("Invalid authorization code")]
    InvalidCode,

    /// More permissions were requested than an authorization code can carry.
    #[error("Too many scopes for an authorization code: {count} (max {max})")]
    ScopeOverflow {
        /// Number of permissions requested.
        count: usize,
        /// Maximum number of permissions per code.
        max: usize,
    },

    /// The token store failed.
    #[error("Token store error: {message}")]
    Store {
        /// Description of the store failure.
        message: String,
    },

    /// Key material or store settings are invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl NotaryError {
    /// Creates a new `Signature` error.
    #[must_use]
    pub fn signature(message: impl Into<String>) -> Self {
        Self::Signature {
            message: message.into(),
        }
    }

    /// Creates a new `MalformedToken` error.
    #[must_use]
    pub fn malformed_token(message: impl Into<String>) -> Self {
        Self::MalformedToken {
            message: message.into(),
        }
    }

    /// Creates a new `InsufficientScope` error from the requested permissions.
    #[must_use]
    pub fn insufficient_scope<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let required = required
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        Self::InsufficientScope { required }
    }

    /// Creates a new `ScopeOverflow` error.
    #[must_use]
    pub fn scope_overflow(count: usize, max: usize) -> Self {
        Self::ScopeOverflow { count, max }
    }

    /// Creates a new `Store` error.
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the caller is at fault (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Signature { .. }
                | Self::MalformedToken { .. }
                | Self::Expired
                | Self::NotFound
                | Self::IdentityMismatch
                | Self::InsufficientScope { .. }
                | Self::InvalidCode
                | Self::ScopeOverflow { .. }
        )
    }

    /// Returns `true` if the server is at fault (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Store { .. } | Self::Configuration { .. } | Self::Internal { .. }
        )
    }

    /// Returns `true` if retrying the whole operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Signature { .. } => ErrorCategory::Authentication,
            Self::MalformedToken { .. } => ErrorCategory::Authentication,
            Self::Expired => ErrorCategory::Authentication,
            Self::NotFound => ErrorCategory::Authentication,
            Self::IdentityMismatch => ErrorCategory::Authorization,
            Self::InsufficientScope { .. } => ErrorCategory::Authorization,
            Self::InvalidCode => ErrorCategory::Grant,
            Self::ScopeOverflow { .. } => ErrorCategory::Validation,
            Self::Store { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the OAuth 2.0 error code for this error.
    ///
    /// Expired, revoked and unknown tokens share one code so a caller cannot
    /// tell them apart.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::Signature { .. }
            | Self::MalformedToken { .. }
            | Self::Expired
            | Self::NotFound => "invalid_token",
            Self::IdentityMismatch | Self::InsufficientScope { .. } => "insufficient_scope",
            Self::InvalidCode => "invalid_grant",
            Self::ScopeOverflow { .. } => "invalid_request",
            Self::Store { .. } => "temporarily_unavailable",
            Self::Configuration { .. } | Self::Internal { .. } => "server_error",
        }
    }

    /// Returns the HTTP status an outer layer should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Signature { .. }
            | Self::MalformedToken { .. }
            | Self::Expired
            | Self::NotFound => 401,
            Self::IdentityMismatch | Self::InsufficientScope { .. } => 403,
            Self::InvalidCode | Self::ScopeOverflow { .. } => 400,
            Self::Store { .. } => 503,
            Self::Configuration { .. } | Self::Internal { .. } => 500,
        }
    }
}

/// Categories of notary errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The presented credential does not establish an identity.
    Authentication,
    /// The identity is established but lacks permission.
    Authorization,
    /// The authorization code grant was rejected.
    Grant,
    /// Request validation errors.
    Validation,
    /// Token store errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Grant => write!(f, "grant"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
