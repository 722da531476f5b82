pub mod access;
pub mod code;
pub mod id_token;
pub mod keys;

use anyhow::{Context, Result};
use notary_auth::{Notary, NotaryConfig, TokenStoreConfig};

/// Builds a notary from `config`. Commands that never touch the token
/// registry run against an in-memory store so they work offline.
pub async fn build_notary(config: &NotaryConfig, needs_store: bool) -> Result<Notary> {
    let notary = if needs_store {
        Notary::from_config(config).await
    } else {
        let mut offline = config.clone();
        offline.token_store = TokenStoreConfig::memory();
        Notary::from_config(&offline).await
    };
    notary.context("failed to initialise notary")
}
