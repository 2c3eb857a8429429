//! PeerLink daemon.
//!
//! Discovers peers on the local network over multicast, a pub/sub broker and
//! subnet probing, keeps the device registry up to date and pairs with
//! trusted peers until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: config and data under the platform data directory
//! peerlink
//!
//! # Custom data directory, no broker
//! peerlink --data-dir /var/lib/peerlink --no-pubsub
//! ```

mod bootstrap;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use bootstrap::config::{load_config, CONFIG_FILE_NAME};
use bootstrap::paths::{default_data_dir, resolve_in};

/// PeerLink - LAN peer discovery and pairing
#[derive(Parser, Debug)]
#[command(name = "peerlink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML). Defaults to `<data dir>/config.toml`
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for the device id, registry snapshot and relative log paths
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Display name announced to peers (defaults to the host name)
    #[arg(short, long)]
    name: Option<String>,

    /// Disable the pub/sub broker transport
    #[arg(long)]
    no_pubsub: bool,

    /// Disable subnet probing
    #[arg(long)]
    no_probe: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let data_dir = match args.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    let config_path = args
        .config
        .unwrap_or_else(|| data_dir.join(CONFIG_FILE_NAME));
    let mut config = load_config(&config_path)?;
    if let Some(name) = args.name {
        config.device.name = name;
    }
    if args.no_pubsub {
        config.pubsub.enabled = false;
    }
    if args.no_probe {
        config.probe.enabled = false;
    }

    let log_dir = config
        .logging
        .directory
        .as_deref()
        .map(|dir| resolve_in(&data_dir, dir));
    bootstrap::tracing::init_tracing_subscriber(log_dir.as_deref())
        .context("Failed to initialize tracing")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %data_dir.display(),
        config = %config_path.display(),
        "Starting PeerLink"
    );

    let wired = bootstrap::wiring::wire(config, &data_dir)?;
    info!(
        device_id = %wired.local.id,
        name = %wired.local.name,
        service_port = wired.local.service_port,
        "Local device"
    );

    let coordinator = wired.coordinator;
    let _events = coordinator.subscribe(|event| match serde_json::to_string(&event) {
        Ok(line) => info!(target: "peerlink::events", "{line}"),
        Err(err) => warn!(error = %err, "Failed to encode device event"),
    });

    coordinator.start_discovery().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    coordinator.stop_discovery().await?;
    Ok(())
}
