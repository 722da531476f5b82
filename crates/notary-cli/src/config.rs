use std::path::Path;

use anyhow::{Context, Result};
use notary_auth::NotaryConfig;

/// Loads the notary configuration: defaults, then the TOML file when it
/// exists, then `NOTARY__SECTION__KEY` environment overrides.
pub fn load_config(path: &Path) -> Result<NotaryConfig> {
    let mut builder = ::config::Config::builder();
    if path.exists() {
        builder = builder.add_source(::config::File::from(path.to_path_buf()));
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
    }
    // Environment variable overrides, e.g. NOTARY__TOKEN_STORE__URI=redis://cache:6379/0
    builder = builder.add_source(::config::Environment::with_prefix("NOTARY").separator("__"));

    let config: NotaryConfig = builder
        .build()
        .context("config build error")?
        .try_deserialize()
        .context("config deserialize error")?;
    config.validate()?;
    Ok(config)
}
