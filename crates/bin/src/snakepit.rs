//! Snakepit - multiplayer snake arena server.

use std::path::PathBuf;

use server::ServerExit;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,server=debug")),
        )
        .init();

    info!("Snakepit Server v{}", env!("CARGO_PKG_VERSION"));

    let path = std::env::var_os("SNAKEPIT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = server::Config::load(&path)?;
    info!("Loaded configuration from {}", path.display());
    info!("  Port: {}", config.server.port);
    info!("  Field: {}x{}", config.field.size_x, config.field.size_y);
    info!("  Max players: {}", config.game.max_players);

    let exit = server::run(config).await?;
    match &exit {
        ServerExit::FrameCap => info!("Frame limit reached, exiting"),
        ServerExit::Fatal(reason) => error!("Stopped by a fatal error: {}", reason),
        ServerExit::Interrupted => info!("Bye"),
    }
    std::process::exit(exit.exit_code());
}
