//! # Courier Server
//!
//! Realtime chat hub: rooms, presence, typing, read receipts and call
//! signaling over WebSocket.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! courier
//!
//! # Run with a config file in the working directory
//! cp courier.example.toml courier.toml && courier
//!
//! # Run with environment variables
//! COURIER_PORT=5000 COURIER_HOST=0.0.0.0 COURIER_MONGODB_URI=mongodb://localhost:27017 courier
//! ```

use anyhow::Result;
use courier_server::{config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=debug,courier_core=debug,courier_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Courier server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
