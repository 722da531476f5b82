use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "notaryctl")]
#[command(about = "Notary operator tool: key material, authorization codes and tokens")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (missing file falls back to defaults and NOTARY__* env vars)
    #[arg(short, long, global = true, env = "NOTARY_CONFIG", default_value = "notary.toml")]
    pub config: PathBuf,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

impl Cli {
    pub fn effective_log_level(&self) -> &str {
        match self.verbose {
            0 => &self.log_level,
            1 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a signing key pair as PEM files
    Keygen(KeygenArgs),
    /// Generate a random hex cipher key for authorization codes
    CipherKey(CipherKeyArgs),
    /// Print the JWK set of the configured signing key
    Jwks,
    /// Mint or decipher authorization codes
    Code(CodeArgs),
    /// Sign or verify identity tokens
    IdToken(IdTokenArgs),
    /// Mint, verify or revoke access tokens against the token store
    Access(AccessArgs),
}

#[derive(clap::Args)]
pub struct KeygenArgs {
    /// Signing algorithm (RS256, RS384, RS512, ES384)
    #[arg(short, long, default_value = "RS512")]
    pub algorithm: String,
    /// Output directory for private.pem and public.pem
    #[arg(short, long, default_value = ".")]
    pub out: PathBuf,
    /// Overwrite existing key files
    #[arg(long)]
    pub force: bool,
}

#[derive(clap::Args)]
pub struct CipherKeyArgs {
    /// Key size in bits
    #[arg(long, default_value = "256")]
    pub bits: KeyBits,
}

#[derive(Clone, Copy, ValueEnum, Default, Debug, PartialEq, Eq)]
pub enum KeyBits {
    #[value(name = "128")]
    Aes128,
    #[value(name = "192")]
    Aes192,
    #[default]
    #[value(name = "256")]
    Aes256,
}

impl KeyBits {
    pub fn byte_len(self) -> usize {
        match self {
            KeyBits::Aes128 => 16,
            KeyBits::Aes192 => 24,
            KeyBits::Aes256 => 32,
        }
    }
}

#[derive(clap::Args)]
pub struct CodeArgs {
    #[command(subcommand)]
    pub command: CodeCommands,
}

#[derive(Subcommand)]
pub enum CodeCommands {
    /// Mint an authorization code
    Mint(CodeMintArgs),
    /// Decipher an authorization code
    Decipher(CodeDecipherArgs),
}

#[derive(clap::Args)]
pub struct CodeMintArgs {
    /// Client identifier
    #[arg(long)]
    pub client_id: u32,
    /// Permission identifiers (comma separated, at most 25)
    #[arg(long = "scope-id", value_delimiter = ',')]
    pub scope_ids: Vec<u16>,
    /// User identifier
    #[arg(long, allow_negative_numbers = true)]
    pub user_id: i64,
}

#[derive(clap::Args)]
pub struct CodeDecipherArgs {
    /// The authorization code
    pub code: String,
}

#[derive(clap::Args)]
pub struct IdTokenArgs {
    #[command(subcommand)]
    pub command: IdTokenCommands,
}

#[derive(Subcommand)]
pub enum IdTokenCommands {
    /// Sign an identity token
    Sign(IdTokenSignArgs),
    /// Verify an identity token and print its claims
    Verify(TokenArg),
}

#[derive(clap::Args)]
pub struct IdTokenSignArgs {
    /// Subject (user identifier)
    #[arg(long)]
    pub sub: String,
    /// Audience (client public identifier)
    #[arg(long)]
    pub aud: String,
    /// Granted permissions (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub scope: Vec<String>,
    /// Nonce echoed from the authorization request
    #[arg(long)]
    pub nonce: Option<String>,
    /// Email address of the subject
    #[arg(long)]
    pub email: Option<String>,
    /// Mark the email address as verified
    #[arg(long, requires = "email")]
    pub email_verified: bool,
}

#[derive(clap::Args)]
pub struct TokenArg {
    /// The token
    pub token: String,
}

#[derive(clap::Args)]
pub struct AccessArgs {
    #[command(subcommand)]
    pub command: AccessCommands,
}

#[derive(Subcommand)]
pub enum AccessCommands {
    /// Mint an access token
    Mint(AccessMintArgs),
    /// Verify an access token for a user and required permissions
    Verify(AccessVerifyArgs),
    /// Revoke an access token
    Revoke(TokenArg),
}

#[derive(clap::Args)]
pub struct AccessMintArgs {
    /// User identifier
    #[arg(long, allow_negative_numbers = true)]
    pub user_id: i64,
    /// Granted permissions (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub scope: Vec<String>,
    /// Token lifetime, e.g. "15m" (defaults to access_token_lifetime)
    #[arg(long)]
    pub lifetime: Option<humantime::Duration>,
}

#[derive(clap::Args)]
pub struct AccessVerifyArgs {
    /// The access token
    pub token: String,
    /// Expected owner
    #[arg(long, allow_negative_numbers = true)]
    pub user_id: i64,
    /// Required permissions (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub scope: Vec<String>,
}
