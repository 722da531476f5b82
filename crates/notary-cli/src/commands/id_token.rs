use anyhow::Result;
use notary_auth::{IdentityClaims, Notary, Scope};

use crate::cli::{IdTokenSignArgs, OutputFormat, TokenArg};
use crate::output::{print_secret, print_value};

/// Builds the claims for `sign`. The issuer is left empty so the notary
/// stamps its own.
pub fn claims_from_args(args: &IdTokenSignArgs) -> IdentityClaims {
    let mut claims = IdentityClaims::new("", &args.aud, &args.sub)
        .with_scope(args.scope.iter().map(String::as_str).collect::<Scope>());
    if let Some(nonce) = &args.nonce {
        claims = claims.with_nonce(nonce);
    }
    if let Some(email) = &args.email {
        claims = claims.with_email(email, args.email_verified);
    }
    claims
}

pub fn sign(notary: &Notary, args: &IdTokenSignArgs, format: OutputFormat) -> Result<()> {
    let token = notary.sign_identity_token(claims_from_args(args))?;
    print_secret("id_token", &token, format)
}

pub fn verify(notary: &Notary, args: &TokenArg, format: OutputFormat) -> Result<()> {
    let claims = notary.verify_identity_token(args.token.trim())?;
    print_value(&serde_json::to_value(&claims)?, format)
}
