//! # kc-server
//!
//! Node process hosting realm bootstrap and federation sync.
//!
//! On start the server:
//! - ensures the administrative realm exists with all of its defaults
//! - registers a sync task for every federation of every realm
//! - runs those tasks under cluster-wide mutual exclusion until shutdown
//!
//! ## Usage
//!
//! ```ignore
//! use kc_server::{Server, ServerConfig};
//!
//! let config = ServerConfig::from_env()?;
//! let server = Server::new(config).await?;
//! server.run().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod providers;

pub use config::ServerConfig;
pub use providers::{HttpMetadataFetcher, Stack};

use std::future::Future;
use std::sync::Arc;

use kc_storage::Storage;

/// A running node.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    stack: Stack,
}

impl Server {
    /// Creates a server with in-memory storage and the HTTP metadata fetcher.
    ///
    /// ## Errors
    ///
    /// Returns an error if the cluster lock backend cannot be reached.
    pub async fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let stack = Stack::build(
            &config,
            Storage::in_memory(),
            Arc::new(HttpMetadataFetcher::new()),
        )
        .await?;
        Ok(Self::from_stack(config, stack))
    }

    /// Creates a server around an already built stack.
    #[must_use]
    pub const fn from_stack(config: ServerConfig, stack: Stack) -> Self {
        Self { config, stack }
    }

    /// Runs the server until a shutdown signal is received.
    ///
    /// ## Errors
    ///
    /// Returns an error if the administrative realm cannot be bootstrapped or
    /// the federation schedule cannot be loaded.
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Runs the server until `shutdown` resolves.
    ///
    /// ## Errors
    ///
    /// Returns an error if the administrative realm cannot be bootstrapped or
    /// the federation schedule cannot be loaded.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        let admin = self.stack.realms.ensure_admin_realm().await?;
        tracing::info!(realm = %admin.name, "administrative realm ready");

        let scheduled = self.stack.federations.schedule_all().await?;
        tracing::info!(
            node_id = %self.stack.scheduler.node_id(),
            scheduled,
            "node started"
        );

        shutdown.await;

        self.stack.scheduler.shutdown();
        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Returns the component stack.
    #[must_use]
    pub const fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Returns the server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Waits for a shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
