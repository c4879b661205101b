//! Daemon-wide state: the single engine instance and its collaborators.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use subs_lifecycle::{
    Clock, EngineSnapshot, ManualClock, SignerRegistry, Subscriptions, SystemClock, Vault,
};
use subs_types::Timestamp;
use tracing::info;

use crate::config::{ClockMode, DaemonConfig};

/// Clock selected by configuration.
#[derive(Clone, Debug)]
pub enum DaemonClock {
    System(SystemClock),
    Manual(ManualClock),
}

impl Clock for DaemonClock {
    fn now(&self) -> Timestamp {
        match self {
            DaemonClock::System(clock) => clock.now(),
            DaemonClock::Manual(clock) => clock.now(),
        }
    }
}

/// The engine as hosted by the daemon.
pub type Engine = Subscriptions<Vault, DaemonClock, SignerRegistry>;

/// On-disk snapshot: engine state plus the vault and the clock reading.
#[derive(Debug, Serialize, Deserialize)]
pub struct DaemonSnapshot {
    pub engine: EngineSnapshot,
    pub vault: Vault,
    pub now: Timestamp,
}

/// Daemon-wide state. Owned by the command loop, which applies one request
/// at a time.
pub struct DaemonState {
    /// The subscription engine.
    pub engine: Engine,
    /// Handle to the engine's clock, for `advance_time`.
    pub clock: DaemonClock,
    /// Configuration.
    pub config: DaemonConfig,
}

impl DaemonState {
    /// Build state from configuration, restoring the configured snapshot if
    /// it exists.
    pub fn from_config(config: DaemonConfig) -> anyhow::Result<Self> {
        let clock = match config.clock.mode {
            ClockMode::System => DaemonClock::System(SystemClock),
            ClockMode::Manual => DaemonClock::Manual(ManualClock::new(config.clock.start)),
        };

        if let Some(path) = config.snapshot_path().filter(|p| p.exists()) {
            let snapshot = load_snapshot(&path)?;
            if let DaemonClock::Manual(manual) = &clock {
                manual.set(snapshot.now);
            }
            let engine = Subscriptions::restore(snapshot.engine, snapshot.vault, clock.clone());
            info!("Restored snapshot from {:?}", path);
            return Ok(Self {
                engine,
                clock,
                config,
            });
        }

        let mut vault = Vault::new();
        for (address, balance, allowance) in config.seed_accounts()? {
            vault
                .deposit(address, balance)
                .with_context(|| format!("seeding {address}"))?;
            vault.approve(address, allowance);
        }
        let engine = Subscriptions::new(
            config.engine_config()?,
            vault,
            clock.clone(),
            SignerRegistry::new(),
        )?;
        Ok(Self {
            engine,
            clock,
            config,
        })
    }

    /// Capture engine, vault, and clock.
    pub fn snapshot(&self) -> DaemonSnapshot {
        DaemonSnapshot {
            engine: self.engine.snapshot(),
            vault: self.engine.transfer().clone(),
            now: self.engine.now(),
        }
    }

    /// Write a CBOR snapshot to `path`.
    pub fn save_snapshot(&self, path: &Path) -> anyhow::Result<()> {
        let mut buf = Vec::new();
        ciborium::into_writer(&self.snapshot(), &mut buf)
            .map_err(|e| anyhow::anyhow!("CBOR serialization failed: {e}"))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, buf).with_context(|| format!("writing {}", path.display()))?;
        info!("Snapshot written to {:?}", path);
        Ok(())
    }
}

fn load_snapshot(path: &Path) -> anyhow::Result<DaemonSnapshot> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    ciborium::from_reader(data.as_slice())
        .map_err(|e| anyhow::anyhow!("CBOR deserialization of {} failed: {e}", path.display()))
}
