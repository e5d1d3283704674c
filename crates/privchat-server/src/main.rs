//! Privchat server binary.
//!
//! # Usage
//!
//! ```bash
//! # Start on the default port
//! privchat-server
//!
//! # Custom bind address and connection limit
//! privchat-server --bind 0.0.0.0:12345 --max-connections 100
//! ```

use std::time::Duration;

use clap::Parser;
use privchat_server::{MemoryCredentialStore, RelayConfig, Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Privchat relay server
#[derive(Parser, Debug)]
#[command(name = "privchat-server")]
#[command(about = "Encrypted chat relay server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:12345")]
    bind: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "256")]
    max_connections: usize,

    /// Idle timeout in seconds before a silent connection is closed
    #[arg(long, default_value = "300")]
    idle_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Privchat server starting");

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        idle_timeout: Duration::from_secs(args.idle_timeout),
        driver: RelayConfig { max_connections: args.max_connections },
    };

    let server = Server::bind(config, MemoryCredentialStore::new()).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
