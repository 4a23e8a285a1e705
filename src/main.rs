mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use shiftbox::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_file(path),
        None => Config::load(),
    }
    .map_err(|e| format!("Failed to load config: {}", e))?;

    match cli.command {
        Commands::Server(args) => commands::serve(config, args).await?,
        Commands::Migrate(args) => commands::migrate(config, args).await?,
    }

    Ok(())
}
