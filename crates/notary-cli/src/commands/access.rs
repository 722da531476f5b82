use std::time::Duration;

use anyhow::Result;
use notary_auth::{Notary, Scope};
use serde_json::json;

use crate::cli::{AccessMintArgs, AccessVerifyArgs, OutputFormat, TokenArg};
use crate::output::{print_success, print_value};

pub async fn mint(
    notary: &Notary,
    args: &AccessMintArgs,
    default_lifetime: Duration,
    format: OutputFormat,
) -> Result<()> {
    let lifetime = args
        .lifetime
        .as_ref()
        .map_or(default_lifetime, |lifetime| **lifetime);
    let scope: Scope = args.scope.iter().map(String::as_str).collect();
    let token = notary
        .mint_access_token(lifetime, args.user_id, scope.clone())
        .await?;

    print_value(
        &json!({
            "access_token": token,
            "token_type": "Bearer",
            "expires_in": lifetime.as_secs(),
            "scope": scope,
        }),
        format,
    )
}

pub async fn verify(notary: &Notary, args: &AccessVerifyArgs, format: OutputFormat) -> Result<()> {
    let record = notary
        .verify_access_token(args.token.trim(), args.user_id, &args.scope)
        .await?;
    print_success("access token is valid");
    print_value(
        &json!({
            "user_id": record.user_id,
            "scope": record.scope,
            "expires_at": record.expires_at,
        }),
        format,
    )
}

pub async fn revoke(notary: &Notary, args: &TokenArg) -> Result<()> {
    notary.revoke_access_token(args.token.trim()).await?;
    print_success("access token revoked");
    Ok(())
}
