//! Credential formats.
//!
//! - [`jwt`]: signed identity tokens
//! - [`access`]: opaque access tokens and their stored records
//! - [`code`]: encrypted, checksummed authorization codes

pub mod access;
pub mod code;
pub mod jwt;

pub use access::{AccessTokenRecord, generate_access_token, token_fingerprint};
pub use code::{AuthorizationCode, AuthorizationCodec, MAX_CODE_SCOPES};
pub use jwt::IdentitySigner;
