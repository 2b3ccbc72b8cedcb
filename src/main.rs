//! tcp-zero: framed TCP echo server
//!
//! Greets every client with a `welcome` frame and answers each line it
//! sends with a `you said: <line>` frame.
//!
//! Configuration via CLI arguments or TOML file; Ctrl-C shuts down cleanly.

use std::sync::Arc;
use tcp_zero::config::Config;
use tcp_zero::protocols::echo::EchoHandler;
use tcp_zero::Server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        queue_capacity = config.queue_capacity,
        backlog = config.backlog,
        accept_backoff_ms = config.accept_backoff.as_millis() as u64,
        "Starting tcp-zero server"
    );

    let server = Arc::new(Server::new(config, EchoHandler::new()));

    let signal_server = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            signal_server.close();
        }
    });

    if let Err(e) = server.listen_and_serve().await {
        error!(error = %e, "Server failed");
        server.close();
        return Err(e.into());
    }

    Ok(())
}
