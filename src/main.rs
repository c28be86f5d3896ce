//! AskMe - streaming chat client CLI
//!
#![doc = "AskMe - streaming chat client CLI"]
#![doc = "Main entry point for the askme application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use askme::cli::{Cli, Commands};
use askme::commands;
use askme::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat { resume } => {
            tracing::info!("Starting interactive chat");
            if let Some(r) = &resume {
                tracing::debug!("Resuming session: {}", r);
            }

            commands::chat::run_chat(config, resume).await?;
            Ok(())
        }
        Commands::History { command } => {
            tracing::info!("Starting history command");
            commands::history::handle_history(&config, command).await?;
            Ok(())
        }
        Commands::Databases => {
            tracing::info!("Listing databases");
            commands::databases::run_databases(&config).await?;
            Ok(())
        }
    }
}

/// Initialize tracing/logging
///
/// Logs go to stderr so streamed responses on stdout stay readable.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "askme=debug" } else { "askme=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
