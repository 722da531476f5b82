//! Identity-token signing keys.
//!
//! Identity tokens are signed with an asymmetric key pair supplied as PEM.
//! The same key pair is published as a JSON Web Key Set so that relying
//! parties can verify tokens without calling back into the notary.
//!
//! ## Supported Algorithms
//!
//! - **RS256**, **RS384**, **RS512**: RSA PKCS#1 v1.5 with SHA-2
//! - **ES384**: ECDSA over P-384
//!
//! RSA private keys may be PKCS#8 or PKCS#1; EC private keys may be PKCS#8 or
//! SEC1. Public keys may be SPKI or (for RSA) PKCS#1.

use std::fmt;
use std::str::FromStr;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use p384::elliptic_curve::sec1::ToEncodedPoint;
use p384::pkcs8::{
    DecodePrivateKey as EcDecodePrivateKey, DecodePublicKey as EcDecodePublicKey,
    EncodePublicKey as EcEncodePublicKey,
};
use p384::{PublicKey as EcPublicKey, SecretKey as EcSecretKey};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::NotaryResult;
use crate::error::NotaryError;

const RSA_KEY_BITS: usize = 2048;

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported identity-token signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// RSA with SHA-256.
    RS256,
    /// RSA with SHA-384.
    RS384,
    /// RSA with SHA-512.
    #[default]
    RS512,
    /// ECDSA with P-384 curve.
    ES384,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::RS512 => Algorithm::RS512,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Returns the algorithm name as used in JWK/JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::ES384 => "ES384",
        }
    }

    /// Returns `true` if this is an RSA-based algorithm.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384 | Self::RS512)
    }

    /// Returns `true` if this is an EC-based algorithm.
    #[must_use]
    pub fn is_ec(&self) -> bool {
        matches!(self, Self::ES384)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = NotaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "RS512" => Ok(Self::RS512),
            "ES384" => Ok(Self::ES384),
            other => Err(NotaryError::configuration(format!(
                "unsupported signing algorithm: {other}"
            ))),
        }
    }
}

// ============================================================================
// JWKS Types
// ============================================================================

/// JSON Web Key Set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwks {
    /// The keys in this set.
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Finds a key by its identifier.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.kid == kid)
    }
}

/// JSON Web Key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC").
    pub kty: String,

    /// Key ID.
    pub kid: String,

    /// Key use ("sig" for signing).
    #[serde(rename = "use")]
    pub use_: String,

    /// Algorithm.
    pub alg: String,

    /// RSA modulus (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// EC curve name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

// ============================================================================
// Signing Key Pair
// ============================================================================

/// PEM-encoded key pair, as written by the operator tool.
#[derive(Clone)]
pub struct PemKeyPair {
    /// PKCS#8 private key.
    pub private_pem: String,
    /// SPKI public key.
    pub public_pem: String,
}

impl fmt::Debug for PemKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PemKeyPair")
            .field("private_pem", &"<redacted>")
            .field("public_pem", &self.public_pem)
            .finish()
    }
}

/// A signing key pair for identity tokens.
pub struct SigningKeyPair {
    /// Key ID, published in the token header and the JWK.
    pub kid: String,

    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    public_key_data: PublicKeyData,
}

/// Public key material for JWKS export.
enum PublicKeyData {
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Ec { x: Vec<u8>, y: Vec<u8> },
}

fn invalid_key(err: impl fmt::Display) -> NotaryError {
    NotaryError::configuration(format!("invalid signing key: {err}"))
}

impl SigningKeyPair {
    /// Loads a key pair from PEM strings.
    ///
    /// # Errors
    ///
    /// Returns [`NotaryError::Configuration`] if either PEM cannot be parsed
    /// for the algorithm's key family.
    pub fn from_pem(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        private_pem: &str,
        public_pem: &str,
    ) -> NotaryResult<Self> {
        let (encoding_key, decoding_key, public_key_data) = if algorithm.is_rsa() {
            Self::load_rsa(private_pem, public_pem)?
        } else {
            Self::load_ec(private_pem, public_pem)?
        };

        Ok(Self {
            kid: kid.into(),
            algorithm,
            encoding_key,
            decoding_key,
            public_key_data,
        })
    }

    fn load_rsa(
        private_pem: &str,
        public_pem: &str,
    ) -> NotaryResult<(EncodingKey, DecodingKey, PublicKeyData)> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_pem))
            .map_err(invalid_key)?;
        let encoding_key =
            EncodingKey::from_rsa_der(private_key.to_pkcs1_der().map_err(invalid_key)?.as_bytes());

        let public_key = RsaPublicKey::from_public_key_pem(public_pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(public_pem))
            .map_err(invalid_key)?;
        let n = public_key.n().to_bytes_be();
        let e = public_key.e().to_bytes_be();
        let decoding_key = DecodingKey::from_rsa_raw_components(&n, &e);

        Ok((encoding_key, decoding_key, PublicKeyData::Rsa { n, e }))
    }

    fn load_ec(
        private_pem: &str,
        public_pem: &str,
    ) -> NotaryResult<(EncodingKey, DecodingKey, PublicKeyData)> {
        let secret_key = EcSecretKey::from_pkcs8_pem(private_pem)
            .or_else(|_| EcSecretKey::from_sec1_pem(private_pem))
            .map_err(invalid_key)?;
        let encoding_key = EncodingKey::from_ec_der(
            secret_key.to_pkcs8_der().map_err(invalid_key)?.as_bytes(),
        );

        let public_key = EcPublicKey::from_public_key_pem(public_pem).map_err(invalid_key)?;
        let point = public_key.to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| invalid_key("missing x coordinate"))?;
        let y = point
            .y()
            .ok_or_else(|| invalid_key("missing y coordinate"))?;

        let decoding_key = DecodingKey::from_ec_components(
            &URL_SAFE_NO_PAD.encode(x.as_slice()),
            &URL_SAFE_NO_PAD.encode(y.as_slice()),
        )
        .map_err(invalid_key)?;

        Ok((
            encoding_key,
            decoding_key,
            PublicKeyData::Ec {
                x: x.to_vec(),
                y: y.to_vec(),
            },
        ))
    }

    /// Generates a fresh key pair for `algorithm` (RSA 2048 or P-384).
    ///
    /// The key ID is derived from the public key.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate(algorithm: SigningAlgorithm) -> NotaryResult<Self> {
        let pem = generate_pem_pair(algorithm)?;
        Self::from_pem(
            key_fingerprint(&pem.public_pem),
            algorithm,
            &pem.private_pem,
            &pem.public_pem,
        )
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Exports the public key as a JWK.
    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        match &self.public_key_data {
            PublicKeyData::Rsa { n, e } => Jwk {
                kty: "RSA".to_string(),
                kid: self.kid.clone(),
                use_: "sig".to_string(),
                alg: self.algorithm.as_str().to_string(),
                n: Some(URL_SAFE_NO_PAD.encode(n)),
                e: Some(URL_SAFE_NO_PAD.encode(e)),
                crv: None,
                x: None,
                y: None,
            },
            PublicKeyData::Ec { x, y } => Jwk {
                kty: "EC".to_string(),
                kid: self.kid.clone(),
                use_: "sig".to_string(),
                alg: self.algorithm.as_str().to_string(),
                n: None,
                e: None,
                crv: Some("P-384".to_string()),
                x: Some(URL_SAFE_NO_PAD.encode(x)),
                y: Some(URL_SAFE_NO_PAD.encode(y)),
            },
        }
    }
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Generates a PKCS#8 private key and its SPKI public key for `algorithm`.
///
/// # Errors
///
/// Returns [`NotaryError::Internal`] if generation or PEM encoding fails.
pub fn generate_pem_pair(algorithm: SigningAlgorithm) -> NotaryResult<PemKeyPair> {
    let keygen = |e: &dyn fmt::Display| NotaryError::internal(format!("key generation: {e}"));

    if algorithm.is_rsa() {
        let private_key =
            RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS).map_err(|e| keygen(&e))?;
        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| keygen(&e))?;
        let public_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| keygen(&e))?;

        Ok(PemKeyPair {
            private_pem: private_pem.to_string(),
            public_pem,
        })
    } else {
        let secret_key = EcSecretKey::random(&mut OsRng);
        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| keygen(&e))?;
        let public_pem = secret_key
            .public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| keygen(&e))?;

        Ok(PemKeyPair {
            private_pem: private_pem.to_string(),
            public_pem,
        })
    }
}

/// Stable key ID for a public key: the first 16 hex characters of the SHA-256
/// of its trimmed PEM text.
#[must_use]
pub fn key_fingerprint(public_pem: &str) -> String {
    let digest = Sha256::digest(public_pem.trim().as_bytes());
    hex::encode(&digest[..8])
}
