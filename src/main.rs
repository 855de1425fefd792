//! Edge optimizer
//!
//! A caching, HTML-rewriting edge built with Tokio and Axum, placed in front
//! of a content-managed origin.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ───────────────▶ http server ─▶ classify ─▶ cache lookup ──(hit)──▶ response
//!                                                     │
//!                                                   (miss)
//!                                                     ▼
//!                                               origin fetch
//!                                                     │
//!                       ┌─────────────────────────────┼────────────────────┐
//!                       ▼                             ▼                    ▼
//!                     asset                    html candidate         passthrough
//!                       │                  stream pass / body pass         │
//!                       ▼                             ▼                    │
//!                 response assembly ◀─────────────────┘                    │
//!                       │  └──▶ background cache write                     │
//!     Client Response   ▼                                                  │
//!     ◀──────────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use edge_optimizer::config::{load_config, ConfigWatcher, EdgeConfig};
use edge_optimizer::lifecycle::{wait_for_signal, Shutdown};
use edge_optimizer::observability::{logging, metrics};
use edge_optimizer::EdgeServer;

#[derive(Parser)]
#[command(name = "edge-optimizer")]
#[command(about = "Edge cache and HTML rewrite pipeline", long_about = None)]
struct Args {
    /// Configuration file (TOML). Watched for changes when given.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => EdgeConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("edge-optimizer v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        origin = %config.origin.address,
        cache_enabled = config.cache.enabled,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    // Keep the watcher alive for the lifetime of the process.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (Some(handle), updates),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                    (None, updates)
                }
            }
        }
        None => (None, mpsc::unbounded_channel().1),
    };

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    let server = EdgeServer::new(config)?;
    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
