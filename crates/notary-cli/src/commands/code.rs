use anyhow::Result;
use notary_auth::Notary;
use serde_json::json;

use crate::cli::{CodeDecipherArgs, CodeMintArgs, OutputFormat};
use crate::output::{print_secret, print_value};

pub fn mint(notary: &Notary, args: &CodeMintArgs, format: OutputFormat) -> Result<()> {
    let code = notary.mint_authorization_code(args.client_id, &args.scope_ids, args.user_id)?;
    print_secret("code", &code, format)
}

pub fn decipher(notary: &Notary, args: &CodeDecipherArgs, format: OutputFormat) -> Result<()> {
    let code = notary.decipher_authorization_code(args.code.trim())?;
    print_value(
        &json!({
            "client_id": code.client_id,
            "scope_ids": code.scope_ids,
            "user_id": code.user_id,
        }),
        format,
    )
}
