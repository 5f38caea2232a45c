//! DOM assistant CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments or configuration
//! - 3: Authentication required
//! - 4: Server or network failure

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dom_chat::{ChatError, DomainError, ErrorKind};

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const AUTH_REQUIRED: u8 = 3;
    pub const SERVER_ERROR: u8 = 4;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "dom=debug" } else { "dom=info" };
    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(
            EnvFilter::from_default_env()
                .add_directive(level.parse().unwrap())
                .add_directive("warn".parse().unwrap()),
        )
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }

    let result = match commands::load_config(cli.config.as_deref(), cli.base_url.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Chat(args) => commands::chat::execute(args, config).await,
            Commands::Ask(args) => commands::ask::execute(args, config).await,
            Commands::Sessions(args) => commands::sessions::execute(args, config).await,
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(error) = cause.downcast_ref::<DomainError>() {
            return match error.kind {
                ErrorKind::Auth | ErrorKind::Permission => ExitCodes::AUTH_REQUIRED,
                ErrorKind::Network | ErrorKind::Server | ErrorKind::Stream => ExitCodes::SERVER_ERROR,
                ErrorKind::Validation | ErrorKind::Client => ExitCodes::INVALID_ARGS,
                ErrorKind::NotFound | ErrorKind::Unknown => ExitCodes::GENERAL_ERROR,
            };
        }
        if let Some(error) = cause.downcast_ref::<ChatError>() {
            return match error {
                ChatError::Config(_) | ChatError::ConfigParse(_) | ChatError::InvalidUrl(_) => {
                    ExitCodes::INVALID_ARGS
                }
                ChatError::Http(_) | ChatError::Transport(_) => ExitCodes::SERVER_ERROR,
                ChatError::Io(_) => ExitCodes::GENERAL_ERROR,
            };
        }
    }
    ExitCodes::GENERAL_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_code_for_domain_errors() {
        let auth = anyhow::Error::new(DomainError::new(ErrorKind::Auth, "expired"));
        assert_eq!(categorize_error(&auth), ExitCodes::AUTH_REQUIRED);

        let network: anyhow::Result<()> =
            Err(DomainError::new(ErrorKind::Network, "offline")).context("Failed to start a session");
        assert_eq!(categorize_error(&network.unwrap_err()), ExitCodes::SERVER_ERROR);
    }

    #[test]
    fn test_exit_code_for_setup_errors() {
        let invalid = anyhow::Error::new(ChatError::InvalidUrl("nowhere".into()));
        assert_eq!(categorize_error(&invalid), ExitCodes::INVALID_ARGS);

        let other = anyhow::anyhow!("something else");
        assert_eq!(categorize_error(&other), ExitCodes::GENERAL_ERROR);
    }
}
