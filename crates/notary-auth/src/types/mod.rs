//! Value types shared by the notary: permission scopes and identity claims.

pub mod claims;
pub mod scope;

pub use claims::IdentityClaims;
pub use scope::Scope;

/// Internal numeric identifier of a registered client.
pub type ClientId = u32;

/// Numeric identifier of a permission, as carried in authorization codes.
pub type PermissionId = u16;

/// Internal numeric identifier of a user.
pub type UserId = i64;
