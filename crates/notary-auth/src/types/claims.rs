//! Identity token claims.

use serde::{Deserialize, Serialize};

use super::scope::Scope;

/// Payload of a signed identity token.
///
/// Registered claims follow RFC 7519; the profile attributes follow the
/// OpenID Connect standard claims. `exp`, `nbf` and `iat` are stamped by the
/// notary at signing time, so callers normally leave them at zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IdentityClaims {
    /// Issuer (this authorization service's URL).
    #[serde(default)]
    pub iss: String,

    /// Audience (the client's public identifier).
    #[serde(default)]
    pub aud: String,

    /// Subject (user identifier).
    pub sub: String,

    /// Issued at (Unix timestamp).
    #[serde(default)]
    pub iat: i64,

    /// Not before (Unix timestamp).
    pub nbf: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Token identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Time the user authenticated (Unix timestamp).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,

    /// Nonce from the authorization request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Primary e-mail address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Whether the e-mail address was verified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,

    /// Profile picture URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    /// Gender as stated by the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,

    /// IANA time zone name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoneinfo: Option<String>,

    /// BCP 47 language tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Permissions granted to the audience.
    #[serde(default)]
    pub scope: Scope,
}

impl IdentityClaims {
    /// Creates claims for `subject` addressed to `audience`.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        audience: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            iss: issuer.into(),
            aud: audience.into(),
            sub: subject.into(),
            ..Self::default()
        }
    }

    /// Sets the granted scope.
    #[must_use]
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the nonce echoed back to the client.
    #[must_use]
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Sets the e-mail address and its verification flag.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>, verified: bool) -> Self {
        self.email = Some(email.into());
        self.email_verified = Some(verified);
        self
    }

    /// Sets the authentication time.
    #[must_use]
    pub fn with_auth_time(mut self, auth_time: i64) -> Self {
        self.auth_time = Some(auth_time);
        self
    }

    /// Returns `true` if every required permission is in the token's scope.
    #[must_use]
    pub fn contains_scope<I, S>(&self, required: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.scope.contains_all(required)
    }

    /// Returns `true` if `now` lies within `[nbf, exp]`.
    #[must_use]
    pub fn is_active_at(&self, now: i64) -> bool {
        self.nbf <= now && now <= self.exp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_scope_unsorted() {
        let claims = IdentityClaims::new("https://auth.example.com", "client", "42")
            .with_scope(Scope::from_iter(["write", "openid", "read"]));

        assert!(claims.contains_scope(["read"]));
        assert!(claims.contains_scope(["read", "write", "openid"]));
        assert!(!claims.contains_scope(["read", "admin"]));
    }

    #[test]
    fn test_is_active_at() {
        let mut claims = IdentityClaims::new("iss", "aud", "sub");
        claims.nbf = 100;
        claims.exp = 200;

        assert!(!claims.is_active_at(99));
        assert!(claims.is_active_at(100));
        assert!(claims.is_active_at(200));
        assert!(!claims.is_active_at(201));
    }

    #[test]
    fn test_serialization_field_names() {
        let claims = IdentityClaims::new("https://issuer", "client-1", "42")
            .with_email("ana@example.com", true)
            .with_scope(Scope::from_iter(["openid"]));

        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["iss"], "https://issuer");
        assert_eq!(json["aud"], "client-1");
        assert_eq!(json["sub"], "42");
        assert_eq!(json["email_verified"], true);
        assert_eq!(json["scope"], serde_json::json!(["openid"]));

        // Absent profile attributes are omitted.
        assert!(json.get("picture").is_none());
        assert!(json.get("nonce").is_none());
    }
}
