//! NAV Engine Service
//!
//! Loads persisted valuation state, runs the major/minor tick timers and
//! publishes NAV updates until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use nav_service::{
    graceful_shutdown, initialize_logging_with_config, load_configuration, scheduler,
    setup_signal_handlers, NavService,
};

#[derive(Parser, Debug)]
#[command(name = "nav-engine", version, about = "Simulated portfolio NAV engine")]
struct Args {
    /// TOML configuration file (falls back to NAV_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the fallback BTC/USD rate instead of the network provider
    #[arg(long)]
    offline: bool,

    /// Seed the simulation for a reproducible run
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let config_path = args.config.or_else(|| std::env::var_os("NAV_CONFIG").map(PathBuf::from));
    let mut config = load_configuration(config_path.as_deref())?;
    if args.offline {
        config.service.offline = true;
    }
    if args.seed.is_some() {
        config.simulation.seed = args.seed;
    }

    initialize_logging_with_config(&config.logging)?;

    info!("Starting NAV Engine Service v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Configuration loaded from {:?}", path);
    }

    let service = Arc::new(NavService::new(config).context("Failed to create NAV service")?);
    let nav = service.initialize().await;
    info!(
        "Initial NAV: {} sats ({:.2} USD), {} sats per token",
        nav.nav_sats, nav.nav_usd, nav.price_per_token_sats
    );

    let mut shutdown_signal = setup_signal_handlers()?;
    info!("Signal handlers configured");

    let scheduler = scheduler::start(service.clone());

    info!("NAV Engine Service is running. Press Ctrl+C to shutdown gracefully.");
    let _ = shutdown_signal.recv().await;

    info!("Shutdown signal received. Initiating graceful shutdown...");
    graceful_shutdown(service, scheduler).await?;

    info!("NAV Engine Service shutdown complete");
    Ok(())
}
