//! Gatekeeper CLI - Operator tools for the membership bot.
//!
//! # Usage
//!
//! ```bash
//! # Validate the bot's environment without starting it
//! gk-cli check-config
//!
//! # Show a user's memberships and eligible groups
//! gk-cli groups --email alice@example.com
//!
//! # Revoke a membership immediately
//! gk-cli revoke --membership groups/abc/memberships/123
//! ```
//!
//! # Commands
//!
//! - `check-config` - Load and validate bot configuration
//! - `groups` - Inspect the directory for one user
//! - `revoke` - Delete a membership

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "gk-cli")]
#[command(author, version, about = "Gatekeeper CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate the bot configuration
    CheckConfig,
    /// List a user's groups and the groups they could be added to
    Groups {
        /// User email address
        #[arg(short, long)]
        email: String,

        /// Google Workspace customer ID
        #[arg(short, long, env = "ORG_CUSTOMER_ID")]
        customer: String,
    },
    /// Revoke a membership immediately
    Revoke {
        /// Membership resource name (`groups/{group}/memberships/{id}`)
        #[arg(short, long)]
        membership: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::warn!("A rustls crypto provider was already installed");
    }

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::CheckConfig => commands::config::check()?,
        Commands::Groups { email, customer } => commands::directory::groups(&email, &customer).await?,
        Commands::Revoke { membership } => commands::directory::revoke(&membership).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_groups() {
        let cli = Cli::try_parse_from(["gk-cli", "groups", "-e", "a@example.com", "-c", "C01"])
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(matches!(
            cli.command,
            Commands::Groups { email, customer } if email == "a@example.com" && customer == "C01"
        ));
    }

    #[test]
    fn test_revoke_requires_membership() {
        assert!(Cli::try_parse_from(["gk-cli", "revoke"]).is_err());
    }
}
