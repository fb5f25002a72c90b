//! pairlink-relay binary entry point.
//!
//! Usage:
//! ```bash
//! pairlink-relay --config pairlink.toml
//! pairlink-relay --help
//! ```

use anyhow::Context;
use clap::Parser;
use pair_core::Signer;
use pairlink_relay::cleanup::spawn_cleanup_task;
use pairlink_relay::clock::SystemClock;
use pairlink_relay::config::Config;
use pairlink_relay::http::{build_router, health};
use pairlink_relay::server::PairRelay;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Signaling relay for QR-code device pairing.
#[derive(Debug, Parser)]
#[command(name = "pairlink-relay", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "pairlink.toml")]
    config: PathBuf,

    /// Override `server.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }

    let signer = match &config.signing.secret {
        Some(secret) => Signer::new(secret.as_bytes()),
        None => {
            tracing::warn!(
                "No signing secret configured; pairing codes will not survive a restart"
            );
            Signer::random()
        }
    };

    health::init_start_time();
    let relay = Arc::new(PairRelay::new(config, signer, Arc::new(SystemClock)));

    let cleanup = spawn_cleanup_task(
        relay.store_arc(),
        relay.rate_limits().clone(),
        relay.metrics_arc(),
        relay.config().cleanup.clone(),
    );

    let bind_address = relay.config().server.bind_address.clone();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {}", bind_address))?;
    tracing::info!(
        "pairlink-relay v{} listening on {}",
        env!("CARGO_PKG_VERSION"),
        listener.local_addr()?
    );

    let app = build_router(relay.clone());
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    cleanup.shutdown().await;
    tracing::info!("pairlink-relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
