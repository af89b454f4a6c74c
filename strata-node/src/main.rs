//! # Strata Node
//!
//! Server entrypoint: loads the configuration, wires the bus, tiers,
//! coordinator and socket front-end together, and runs until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use strata_core::bus::MessageBus;
use strata_core::config::ConfigLoader;
use strata_core::network::SocketServer;
use strata_core::storage::{DiskTier, RamTier, StorageCoordinator};

/// CLI structure
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(about = "strata - two-tier key/value cache over a unix socket")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(default_value = "config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("Server failed: {e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ConfigLoader::with_path(&cli.config).load()?;
    info!(
        ram_mb = config.ram.max_size_mb,
        db = %config.disk.db_file.display(),
        socket = %config.socket.socket_path.display(),
        "configuration loaded"
    );

    let bus = Arc::new(MessageBus::new());

    let ram = Arc::new(RamTier::new(config.ram.max_size_mb));
    ram.register(&bus)?;
    let reaper = ram.start_reaper();

    let disk = Arc::new(DiskTier::open(&config.disk.db_file)?);
    disk.register(&bus)?;

    let coordinator = Arc::new(StorageCoordinator::new(Arc::clone(&bus)));
    coordinator.register()?;

    let server = SocketServer::bind(&config.socket.socket_path, Arc::clone(&bus))?;
    info!("strata node ready");

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    bus.shutdown().await;
    ram.shutdown();
    if let Err(e) = reaper.await {
        warn!("reaper task failed during shutdown: {e}");
    }
    if let Err(e) = std::fs::remove_file(&config.socket.socket_path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("could not remove socket file: {e}");
        }
    }

    info!("shutdown complete");
    Ok(())
}
