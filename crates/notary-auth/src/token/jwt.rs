//! Identity-token encoding and validation.
//!
//! Identity tokens are compact JWS strings signed with the notary's
//! [`SigningKeyPair`]. Validation is pinned to the configured algorithm: a
//! token whose header names any other algorithm is rejected before its
//! signature is looked at.

use jsonwebtoken::{Header, Validation, decode, encode};

use crate::NotaryResult;
use crate::error::NotaryError;
use crate::identity::{Jwks, SigningAlgorithm, SigningKeyPair};
use crate::types::IdentityClaims;

impl From<jsonwebtoken::errors::Error> for NotaryError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                Self::signature(err.to_string())
            }
            ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => Self::Expired,
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => Self::configuration(err.to_string()),
            _ => Self::malformed_token(err.to_string()),
        }
    }
}

/// Signs and verifies identity tokens with a single key pair.
///
/// Thread-safe (`Send + Sync`); the key material is immutable.
#[derive(Debug)]
pub struct IdentitySigner {
    key: SigningKeyPair,
    validation: Validation,
}

impl IdentitySigner {
    /// Creates a signer for `key`.
    #[must_use]
    pub fn new(key: SigningKeyPair) -> Self {
        let mut validation = Validation::new(key.algorithm.to_jwt_algorithm());
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        // Audience and issuer are the caller's concern.
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "nbf", "sub"]);

        Self { key, validation }
    }

    /// Signs `claims` as they are; no timestamps are stamped here.
    ///
    /// # Errors
    ///
    /// Returns [`NotaryError::Internal`] if the claims cannot be serialized or
    /// the key refuses to sign.
    pub fn encode(&self, claims: &IdentityClaims) -> NotaryResult<String> {
        let mut header = Header::new(self.key.algorithm.to_jwt_algorithm());
        header.kid = Some(self.key.kid.clone());

        encode(&header, claims, self.key.encoding_key())
            .map_err(|e| NotaryError::internal(format!("failed to sign identity token: {e}")))
    }

    /// Verifies the signature and time window of `token` and returns its claims.
    ///
    /// # Errors
    ///
    /// - [`NotaryError::Signature`] on a bad signature or foreign algorithm
    /// - [`NotaryError::Expired`] when now is outside `[nbf, exp]`
    /// - [`NotaryError::MalformedToken`] when the token cannot be parsed
    pub fn decode(&self, token: &str) -> NotaryResult<IdentityClaims> {
        let data = decode::<IdentityClaims>(token, self.key.decoding_key(), &self.validation)?;
        Ok(data.claims)
    }

    /// Returns the configured algorithm.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.key.algorithm
    }

    /// Returns the signing key ID.
    #[must_use]
    pub fn current_kid(&self) -> &str {
        &self.key.kid
    }

    /// Returns the JWKS containing the verification key.
    #[must_use]
    pub fn jwks(&self) -> Jwks {
        Jwks {
            keys: vec![self.key.to_jwk()],
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use super::*;
    use crate::identity::{PemKeyPair, generate_pem_pair};
    use crate::types::Scope;

    fn rsa_pem() -> &'static PemKeyPair {
        static PEM: OnceLock<PemKeyPair> = OnceLock::new();
        PEM.get_or_init(|| generate_pem_pair(SigningAlgorithm::RS512).unwrap())
    }

    fn signer(algorithm: SigningAlgorithm) -> IdentitySigner {
        let pem = rsa_pem();
        IdentitySigner::new(
            SigningKeyPair::from_pem("test-key", algorithm, &pem.private_pem, &pem.public_pem)
                .unwrap(),
        )
    }

    fn now() -> i64 {
        time::OffsetDateTime::now_utc().unix_timestamp()
    }

    fn claims(nbf: i64, exp: i64) -> IdentityClaims {
        let mut claims = IdentityClaims::new("https://auth.example.com", "client-1", "42")
            .with_scope(Scope::from_iter(["openid", "read"]));
        claims.iat = nbf;
        claims.nbf = nbf;
        claims.exp = exp;
        claims
    }

    #[test]
    fn test_encode_decode() {
        let signer = signer(SigningAlgorithm::RS512);
        let now = now();

        let token = signer.encode(&claims(now, now + 60)).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let decoded = signer.decode(&token).unwrap();
        assert_eq!(decoded.sub, "42");
        assert_eq!(decoded.aud, "client-1");
        assert!(decoded.contains_scope(["read", "openid"]));
    }

    #[test]
    fn test_header_carries_kid_and_algorithm() {
        let signer = signer(SigningAlgorithm::RS384);
        let token = signer.encode(&claims(now(), now() + 60)).unwrap();

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, jsonwebtoken::Algorithm::RS384);
        assert_eq!(header.kid.as_deref(), Some("test-key"));
    }

    #[test]
    fn test_es384_encode_decode() {
        let key = SigningKeyPair::generate(SigningAlgorithm::ES384).unwrap();
        let signer = IdentitySigner::new(key);

        let token = signer.encode(&claims(now(), now() + 60)).unwrap();
        assert_eq!(signer.decode(&token).unwrap().sub, "42");
    }

    #[test]
    fn test_expired_token_rejected() {
        let signer = signer(SigningAlgorithm::RS512);
        let now = now();

        let token = signer.encode(&claims(now - 7200, now - 3600)).unwrap();
        assert!(matches!(signer.decode(&token), Err(NotaryError::Expired)));
    }

    #[test]
    fn test_not_yet_valid_token_rejected() {
        let signer = signer(SigningAlgorithm::RS512);
        let now = now();

        let token = signer.encode(&claims(now + 3600, now + 7200)).unwrap();
        assert!(matches!(signer.decode(&token), Err(NotaryError::Expired)));
    }

    #[test]
    fn test_algorithm_pinning() {
        // Same RSA key, different algorithm: the header alone must cause rejection.
        let rs256 = signer(SigningAlgorithm::RS256);
        let rs512 = signer(SigningAlgorithm::RS512);

        let token = rs256.encode(&claims(now(), now() + 60)).unwrap();
        assert!(matches!(
            rs512.decode(&token),
            Err(NotaryError::Signature { .. })
        ));
    }

    #[test]
    fn test_foreign_key_rejected() {
        let ours = signer(SigningAlgorithm::RS512);
        let theirs =
            IdentitySigner::new(SigningKeyPair::generate(SigningAlgorithm::RS512).unwrap());

        let token = theirs.encode(&claims(now(), now() + 60)).unwrap();
        assert!(matches!(
            ours.decode(&token),
            Err(NotaryError::Signature { .. })
        ));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let signer = signer(SigningAlgorithm::RS512);
        let token = signer.encode(&claims(now(), now() + 60)).unwrap();

        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        let forged = claims(now(), now() + 60_000);
        parts[1] = base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            serde_json::to_vec(&forged).unwrap(),
        );

        assert!(matches!(
            signer.decode(&parts.join(".")),
            Err(NotaryError::Signature { .. })
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let signer = signer(SigningAlgorithm::RS512);
        assert!(matches!(
            signer.decode("not-a-token"),
            Err(NotaryError::MalformedToken { .. })
        ));
    }

    #[test]
    fn test_jwks() {
        let signer = signer(SigningAlgorithm::RS512);
        let jwks = signer.jwks();

        assert_eq!(jwks.keys.len(), 1);
        assert_eq!(jwks.keys[0].alg, "RS512");
        assert!(jwks.find(signer.current_kid()).is_some());
    }
}
