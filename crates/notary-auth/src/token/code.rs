//! Authorization codes.
//!
//! An authorization code carries a user's consent from the authorization step to
//! the code-exchange step without any server-side state. The logical content
//! (client, granted permission IDs, user) is packed into a fixed 96-byte block
//! interleaved with random filler and protected by a truncated SHA-256
//! checksum:
//!
//! ```text
//!         0  1  2  3  4  5  6  7  8  9  A  B  C  D  E  F
//! 0x00    C  C  C  C  N  r  P  P  P  P  P  P  r  r  r  r
//! 0x10    P  P  P  P  P  P  P  P  P  P  P  P  r  r  r  r
//! 0x20    P  P  P  P  P  P  P  P  P  P  P  P  r  r  r  r
//! 0x30    P  P  P  P  P  P  P  P  P  P  P  P  r  r  r  r
//! 0x40    P  P  P  P  P  P  P  P  U  U  U  U  r  r  r  r
//! 0x50    U  U  U  U  H  H  H  H  H  H  H  H  r  r  r  r
//!
//! C = client id (u32 BE)        N = permission count (u8, <= 25)
//! P = permission id slots (u16 BE, 25 slots, unused slots are filler)
//! U = user id (i64 BE, high half at 0x48, low half at 0x50)
//! H = first 8 bytes of SHA-256(C || N || used P || U)
//! r = filler from the OS random source
//! ```
//!
//! The block is sealed with AES-GCM under a fresh random nonce and rendered as
//! unpadded URL-safe base64 of `nonce || ciphertext || tag`. Every decoding
//! failure maps to the same [`NotaryError::InvalidCode`].

use std::fmt;
use std::ops::Range;

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm, Nonce};
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::{Engine, alphabet};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::NotaryResult;
use crate::error::NotaryError;
use crate::types::{ClientId, PermissionId, UserId};

type Aes192Gcm = AesGcm<Aes192, U12>;

/// Size of the plaintext code block.
pub const CODE_BLOCK_LEN: usize = 0x60;

/// Maximum number of permissions one code can carry.
pub const MAX_CODE_SCOPES: usize = 25;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const SEALED_LEN: usize = NONCE_LEN + CODE_BLOCK_LEN + TAG_LEN;
const CHECKSUM_LEN: usize = 8;

/// Associated data bound into every sealed code.
const CODE_AAD: &[u8] = b"notary/authorization-code/v1";

const CLIENT_ID: Range<usize> = 0x00..0x04;
const SCOPE_COUNT: usize = 0x04;
const SCOPE_START: usize = 0x06;
const SCOPE_END: usize = 0x48;
const USER_ID_HIGH: Range<usize> = 0x48..0x4C;
const USER_ID_LOW: Range<usize> = 0x50..0x54;
const CHECKSUM: Range<usize> = 0x54..0x5C;

const CODE_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Logical content of an authorization code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    /// Client the code was issued to.
    pub client_id: ClientId,
    /// Permissions the user granted, in grant order.
    pub scope_ids: Vec<PermissionId>,
    /// User who granted them.
    pub user_id: UserId,
}

/// Byte offsets of the permission slots.
///
/// Slots are two bytes wide; the last four bytes of every 16-byte row are
/// filler, so the cursor jumps over them.
fn scope_slots() -> impl Iterator<Item = usize> {
    let mut cursor = SCOPE_START;
    std::iter::from_fn(move || {
        if cursor % 0x10 == 0x0C {
            cursor += 4;
        }
        if cursor >= SCOPE_END {
            return None;
        }
        let slot = cursor;
        cursor += 2;
        Some(slot)
    })
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

/// Constant-time comparison of equally sized byte strings.
fn checksums_match(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// The 96-byte plaintext block.
struct CodeBlock([u8; CODE_BLOCK_LEN]);

impl CodeBlock {
    fn pack(code: &AuthorizationCode, rng: &mut impl RngCore) -> NotaryResult<Self> {
        let count = code.scope_ids.len();
        if count > MAX_CODE_SCOPES {
            return Err(NotaryError::scope_overflow(count, MAX_CODE_SCOPES));
        }

        // Fill everything with randomness, then overwrite the canonical fields.
        let mut bytes = [0u8; CODE_BLOCK_LEN];
        rng.fill_bytes(&mut bytes);

        bytes[CLIENT_ID].copy_from_slice(&code.client_id.to_be_bytes());
        bytes[SCOPE_COUNT] = count as u8;
        for (slot, id) in scope_slots().zip(&code.scope_ids) {
            bytes[slot..slot + 2].copy_from_slice(&id.to_be_bytes());
        }
        let user = code.user_id.to_be_bytes();
        bytes[USER_ID_HIGH].copy_from_slice(&user[..4]);
        bytes[USER_ID_LOW].copy_from_slice(&user[4..]);

        let mut block = Self(bytes);
        let checksum = block.canonical_checksum();
        block.0[CHECKSUM].copy_from_slice(&checksum);
        Ok(block)
    }

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        (bytes.len() == CODE_BLOCK_LEN).then(|| Self(read_array(bytes)))
    }

    fn scope_count(&self) -> usize {
        usize::from(self.0[SCOPE_COUNT])
    }

    fn client_id(&self) -> ClientId {
        u32::from_be_bytes(read_array(&self.0[CLIENT_ID]))
    }

    fn scope_ids(&self) -> Vec<PermissionId> {
        scope_slots()
            .take(self.scope_count())
            .map(|slot| u16::from_be_bytes(read_array(&self.0[slot..slot + 2])))
            .collect()
    }

    fn user_id(&self) -> UserId {
        let mut user = [0u8; 8];
        user[..4].copy_from_slice(&self.0[USER_ID_HIGH]);
        user[4..].copy_from_slice(&self.0[USER_ID_LOW]);
        i64::from_be_bytes(user)
    }

    /// Checksum over the non-filler bytes, in canonical order.
    fn canonical_checksum(&self) -> [u8; CHECKSUM_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(&self.0[CLIENT_ID]);
        hasher.update([self.0[SCOPE_COUNT]]);
        for slot in scope_slots().take(self.scope_count()) {
            hasher.update(&self.0[slot..slot + 2]);
        }
        hasher.update(&self.0[USER_ID_HIGH]);
        hasher.update(&self.0[USER_ID_LOW]);
        read_array(&hasher.finalize()[..CHECKSUM_LEN])
    }

    fn unpack(&self) -> NotaryResult<AuthorizationCode> {
        if self.scope_count() > MAX_CODE_SCOPES {
            tracing::debug!(reason = "scope_count", "Rejected authorization code");
            return Err(NotaryError::InvalidCode);
        }
        if !checksums_match(&self.canonical_checksum(), &self.0[CHECKSUM]) {
            tracing::debug!(reason = "checksum", "Rejected authorization code");
            return Err(NotaryError::InvalidCode);
        }
        Ok(AuthorizationCode {
            client_id: self.client_id(),
            scope_ids: self.scope_ids(),
            user_id: self.user_id(),
        })
    }
}

fn keyed<C: KeyInit>(key: &[u8]) -> NotaryResult<Box<C>> {
    C::new_from_slice(key)
        .map(Box::new)
        .map_err(|e| NotaryError::configuration(format!("Failed to create code cipher: {e}")))
}

/// AES-GCM keyed by the pre-shared code secret; key length picks the variant.
enum CodeCipher {
    Aes128(Box<Aes128Gcm>),
    Aes192(Box<Aes192Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl CodeCipher {
    fn new(key: &[u8]) -> NotaryResult<Self> {
        match key.len() {
            16 => Ok(Self::Aes128(keyed(key)?)),
            24 => Ok(Self::Aes192(keyed(key)?)),
            32 => Ok(Self::Aes256(keyed(key)?)),
            other => Err(NotaryError::configuration(format!(
                "Code cipher key must be 16, 24 or 32 bytes, got {other}"
            ))),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Aes128(_) => "AES-128-GCM",
            Self::Aes192(_) => "AES-192-GCM",
            Self::Aes256(_) => "AES-256-GCM",
        }
    }

    fn seal(&self, nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
        let nonce = Nonce::from_slice(nonce);
        let payload = Payload {
            msg: plaintext,
            aad: CODE_AAD,
        };
        match self {
            Self::Aes128(cipher) => cipher.encrypt(nonce, payload),
            Self::Aes192(cipher) => cipher.encrypt(nonce, payload),
            Self::Aes256(cipher) => cipher.encrypt(nonce, payload),
        }
    }

    fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
        let nonce = Nonce::from_slice(nonce);
        let payload = Payload {
            msg: ciphertext,
            aad: CODE_AAD,
        };
        match self {
            Self::Aes128(cipher) => cipher.decrypt(nonce, payload),
            Self::Aes192(cipher) => cipher.decrypt(nonce, payload),
            Self::Aes256(cipher) => cipher.decrypt(nonce, payload),
        }
    }
}

/// Stateless encoder/decoder for authorization codes.
///
/// Encoding is randomized: equal inputs never produce equal codes. The codec
/// does not enforce single use; see [`crate::grant::CodeReplayGuard`].
pub struct AuthorizationCodec {
    cipher: CodeCipher,
}

impl AuthorizationCodec {
    /// Creates a codec from a raw 16, 24 or 32 byte key.
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::Configuration` for any other key length.
    pub fn new(key: &[u8]) -> NotaryResult<Self> {
        Ok(Self {
            cipher: CodeCipher::new(key)?,
        })
    }

    /// Creates a codec from a hex-encoded key.
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::Configuration` if the key is not valid hex or has
    /// the wrong length.
    pub fn from_hex(key: &str) -> NotaryResult<Self> {
        let key = hex::decode(key.trim())
            .map_err(|e| NotaryError::configuration(format!("Invalid code cipher key hex: {e}")))?;
        Self::new(&key)
    }

    /// Encodes an authorization code.
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::ScopeOverflow` if more than [`MAX_CODE_SCOPES`]
    /// permissions are given.
    pub fn encode(
        &self,
        client_id: ClientId,
        scope_ids: &[PermissionId],
        user_id: UserId,
    ) -> NotaryResult<String> {
        let code = AuthorizationCode {
            client_id,
            scope_ids: scope_ids.to_vec(),
            user_id,
        };
        let block = CodeBlock::pack(&code, &mut OsRng)?;
        let sealed = self.seal_block(&block)?;
        Ok(CODE_ENGINE.encode(sealed))
    }

    /// Decodes and authenticates an authorization code.
    ///
    /// # Errors
    ///
    /// Returns `NotaryError::InvalidCode` if the code is malformed, was sealed
    /// under another key, was modified, or fails its checksum.
    pub fn decode(&self, code: &str) -> NotaryResult<AuthorizationCode> {
        let sealed = CODE_ENGINE
            .decode(code.trim().as_bytes())
            .map_err(|_| NotaryError::InvalidCode)?;
        self.open_block(&sealed)?.unpack()
    }

    fn seal_block(&self, block: &CodeBlock) -> NotaryResult<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .seal(&nonce, &block.0)
            .map_err(|e| NotaryError::internal(format!("Code encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(SEALED_LEN);
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open_block(&self, sealed: &[u8]) -> NotaryResult<CodeBlock> {
        if sealed.len() != SEALED_LEN {
            tracing::debug!(reason = "length", "Rejected authorization code");
            return Err(NotaryError::InvalidCode);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self.cipher.open(nonce, ciphertext).map_err(|_| {
            tracing::debug!(reason = "decrypt", "Rejected authorization code");
            NotaryError::InvalidCode
        })?;
        CodeBlock::from_slice(&plaintext).ok_or(NotaryError::InvalidCode)
    }
}

impl fmt::Debug for AuthorizationCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationCodec")
            .field("cipher", &self.cipher.name())
            .finish()
    }
}
