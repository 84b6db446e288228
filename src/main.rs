//! Parley - tool-calling chat client
//!
#![doc = "Parley - tool-calling chat client"]
#![doc = "Main entry point for the Parley command-line application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use parley::chat::metrics::init_metrics_exporter;
use parley::cli::{Cli, Commands};
use parley::commands;
use parley::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    init_tracing(cli.verbose, cli.json_logs);
    init_metrics_exporter();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    match cli.command {
        Commands::Chat { turn, resume } => {
            tracing::info!("Starting interactive chat");
            if let Some(r) = &resume {
                tracing::debug!("Resuming chat: {}", r);
            }
            commands::chat::run_chat(&config, turn, resume).await
        }
        Commands::Ask { text, turn } => commands::ask::run_ask(&config, &text, turn).await,
        Commands::Settings { command } => commands::settings::handle_settings(&config, command),
        Commands::Models { command } => commands::models::handle_models(&config, command).await,
        Commands::Providers => commands::models::list_providers(&config),
        Commands::History { command } => commands::history::handle_history(&config, command),
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so command output on stdout stays machine readable.
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "parley=debug" } else { "parley=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
