//! fanartd, the fanart resolution daemon.
//!
//! Serves `GET /fanart` over HTTP, redirecting clients to the best artwork
//! image found for a show.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use fanart::server::config::Config;
use fanart::server::{self, AppState};

/// Fanart daemon: cached show artwork lookups.
#[derive(Parser)]
#[command(name = "fanartd")]
#[command(version = fanart::PKG_VERSION)]
#[command(about = "Fanart resolution daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Port to listen on, overriding the configured address's port.
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: info; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // Load configuration
    let config = Config::load(args.config.as_deref())?;
    let addr = config.socket_addr(args.port)?;

    let state = AppState::from_config(&config)?;

    if let Some(interval) = config.cache.cleanup_interval() {
        server::spawn_cleanup(Arc::clone(state.cache()), interval);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(version = fanart::PKG_VERSION, %addr, ttl_secs = config.cache.ttl_secs, "fanartd starting");

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("fanartd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
}
