//! Talaria - terminal and local-web chat client
//!
//! Main entry point: initializes tracing, loads configuration, and
//! dispatches to the command handlers.

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use talaria::cli::{Cli, Commands};
use talaria::commands;
use talaria::config::Config;

/// Default config file looked up next to the working directory
const DEFAULT_CONFIG_PATH: &str = "talaria.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_tracing(cli.verbose);

    // Mirror a CLI-supplied storage path into the env var the storage
    // initializer honors, so callers stay unchanged.
    if let Some(db_path) = &cli.storage_path {
        std::env::set_var("TALARIA_HISTORY_DB", db_path);
        tracing::info!("Using storage DB override: {}", db_path);
    }

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)?;
    config.validate()?;

    match cli.command {
        Commands::Chat {
            conversation,
            model,
        } => {
            tracing::info!("Starting interactive chat mode");
            if let Some(id) = &conversation {
                tracing::debug!("Resuming conversation: {}", id);
            }
            if let Some(m) = &model {
                tracing::debug!("Using model override: {}", m);
            }
            commands::chat::run_chat(config, conversation, model).await?;
            Ok(())
        }
        Commands::Serve { port } => {
            tracing::info!("Starting web server");
            commands::serve::run_serve(config, config_path, port).await?;
            Ok(())
        }
        Commands::History { command } => {
            tracing::info!("Starting history command");
            commands::history::handle_history(command)?;
            Ok(())
        }
        Commands::Config { command } => {
            commands::config_cmd::handle_config(&config_path, config, command)?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "talaria=debug" } else { "talaria=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
