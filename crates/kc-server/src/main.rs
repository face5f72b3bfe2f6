//! # kc-server
//!
//! Entry point of a realm bootstrap and federation sync node.

#![forbid(unsafe_code)]
#![deny(warnings)]

use kc_server::{Server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(node_id = %config.core.cluster.node_id, "kc-server starting...");

    Server::new(config).await?.run().await
}
