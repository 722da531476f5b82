mod cli;
mod commands;
mod config;
mod logging;
mod output;

use anyhow::Result;
use clap::Parser;

use cli::{AccessCommands, Cli, CodeCommands, Commands, IdTokenCommands};
use commands::build_notary;
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.effective_log_level());
    let format = cli.format;

    match &cli.command {
        Commands::Keygen(args) => commands::keys::keygen(args, format)?,
        Commands::CipherKey(args) => commands::keys::cipher_key(args, format)?,
        Commands::Jwks => {
            let config = config::load_config(&cli.config)?;
            let notary = build_notary(&config, false).await?;
            commands::keys::jwks(&notary)?;
        }
        Commands::Code(args) => {
            let config = config::load_config(&cli.config)?;
            let notary = build_notary(&config, false).await?;
            match &args.command {
                CodeCommands::Mint(args) => commands::code::mint(&notary, args, format)?,
                CodeCommands::Decipher(args) => commands::code::decipher(&notary, args, format)?,
            }
        }
        Commands::IdToken(args) => {
            let config = config::load_config(&cli.config)?;
            let notary = build_notary(&config, false).await?;
            match &args.command {
                IdTokenCommands::Sign(args) => commands::id_token::sign(&notary, args, format)?,
                IdTokenCommands::Verify(args) => commands::id_token::verify(&notary, args, format)?,
            }
        }
        Commands::Access(args) => {
            let config = config::load_config(&cli.config)?;
            let notary = build_notary(&config, true).await?;
            let result = match &args.command {
                AccessCommands::Mint(args) => {
                    commands::access::mint(&notary, args, config.access_token_lifetime, format)
                        .await
                }
                AccessCommands::Verify(args) => {
                    commands::access::verify(&notary, args, format).await
                }
                AccessCommands::Revoke(args) => commands::access::revoke(&notary, args).await,
            };
            notary.close().await;
            result?;
        }
    }

    Ok(())
}
