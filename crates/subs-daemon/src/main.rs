//! subs-daemon: hosts one subscription ledger behind line-delimited
//! JSON-RPC on stdin/stdout.
//!
//! Requests are applied one at a time. Logs go to stderr so stdout carries
//! only protocol traffic.

mod commands;
mod config;
mod events;
mod rpc;
mod state;

use tokio::io::BufReader;
use tracing::{error, info};

use crate::config::DaemonConfig;
use crate::state::DaemonState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    // 2. Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.advanced.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!(
        epoch_length = config.ledger.epoch_length,
        "Subscription daemon starting"
    );

    // 3. Build state, restoring a snapshot if one exists
    let mut state = DaemonState::from_config(config)?;

    // 4. Serve until stdin closes or Ctrl-C
    tokio::select! {
        result = rpc::serve(&mut state, BufReader::new(tokio::io::stdin()), tokio::io::stdout()) => {
            if let Err(e) = result {
                error!("RPC loop error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    if let Some(path) = state.config.snapshot_path() {
        state.save_snapshot(&path)?;
    }

    info!("Daemon stopped");
    Ok(())
}
