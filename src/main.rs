//! Tic-Tac-Toe Server
//!
//! Matchmaking and move relay for online tic-tac-toe.

use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tictactoe::{GameServer, ServerConfig, VERSION};

#[cfg(feature = "debug-tracing")]
const DEFAULT_FILTER: &str = "debug";
#[cfg(not(feature = "debug-tracing"))]
const DEFAULT_FILTER: &str = "info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    info!("Tic-Tac-Toe Server v{}", VERSION);

    let config = ServerConfig::from_env()?;
    info!("Bind address: {}", config.bind_addr);
    match config.matchmaking_timeout {
        Some(timeout) => info!("Matchmaking timeout: {:?}", timeout),
        None => info!("Matchmaking timeout: disabled"),
    }

    let server = Arc::new(GameServer::new(config));

    let signal_server = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                signal_server.shutdown();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await?;

    info!("Server stopped");
    Ok(())
}
