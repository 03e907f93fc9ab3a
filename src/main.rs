//! Stockroom - A TLS Inventory Server
//!
//! This is the main entry point for the Stockroom server.
//! It loads the configuration, TLS material and store, then serves
//! connections until SIGINT or SIGTERM.

use anyhow::Context;
use clap::Parser;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use stockroom::auth::Argon2Hasher;
use stockroom::commands::CommandHandler;
use stockroom::config::ServerConfig;
use stockroom::server::{load_acceptor, Server};
use stockroom::storage::{Database, StorePool};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = ServerConfig::parse();

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(config).await {
        error!("FATAL: {e:#}");
        std::process::exit(1);
    }
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;

    let acceptor = load_acceptor(&config.cert, &config.key)
        .context("failed to load TLS certificate and key")?;
    info!(cert = %config.cert.display(), "TLS configuration loaded");

    let db = Arc::new(
        Database::open(config.data_file.clone()).context("failed to open the store")?,
    );
    let pool = StorePool::new(Arc::clone(&db), config.pool_config())
        .await
        .context("failed to create the store pool")?;
    pool.ping().await.context("store is unreachable")?;
    info!(
        pool_size = config.pool_size,
        data_file = ?config.data_file,
        "Store ready"
    );

    let hasher = Argon2Hasher::new(config.hash_params()).context("invalid hash parameters")?;
    let handler = CommandHandler::new(pool, Arc::new(hasher));

    let server = Server::bind(
        &config.bind_address(),
        acceptor,
        handler,
        config.server_options(),
    )
    .await?;
    let stats = server.stats();

    info!(
        version = stockroom::VERSION,
        addr = %config.bind_address(),
        "Stockroom started, use Ctrl+C to shut down gracefully"
    );

    // Consumes the handler and with it the last pool handle
    server.run(shutdown_signal()).await?;

    db.flush().context("failed to flush the store")?;
    info!(
        sessions = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        handshake_failures = stats.handshake_failures.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}

/// Completes on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
