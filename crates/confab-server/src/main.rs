//! # Confab Server
//!
//! Realtime chat relay: named rooms, per-room secrets, end-to-end
//! obscured messages.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! confab
//!
//! # Run with environment variables
//! CONFAB_PORT=8080 CONFAB_HOST=0.0.0.0 confab
//! ```
//!
//! Configuration is read from `confab.toml` if present; see
//! [`confab_server::config`].

use anyhow::Result;
use confab_server::{config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "confab=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load()?;

    tracing::info!("Starting confab relay on {}:{}", config.host, config.port);

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}
