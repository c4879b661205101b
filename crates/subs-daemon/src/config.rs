//! Configuration file management.
//!
//! `config.toml` lives in `$SUBS_DATA_DIR`, or the platform data directory
//! when the variable is unset. A missing file yields the defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use subs_lifecycle::SubscriptionsConfig;
use subs_types::{Address, Amount, Timestamp};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Ledger identity and parties.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Time source.
    #[serde(default)]
    pub clock: ClockConfig,
    /// Accounts seeded into the in-memory vault.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    /// Advanced settings.
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Epoch length in time units. Must be positive.
    #[serde(default = "default_epoch_length")]
    pub epoch_length: Timestamp,
    /// Receiver of collected revenue.
    #[serde(default = "default_beneficiary")]
    pub beneficiary: String,
    /// Identity of the ledger itself.
    #[serde(default = "default_ledger_address")]
    pub ledger_address: String,
    /// Privileged `create` caller. Empty = disabled.
    #[serde(default)]
    pub recurring_payments: String,
}

/// Clock source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    /// Unix seconds.
    #[default]
    System,
    /// Driven by the `advance_time` command.
    Manual,
}

/// Clock configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClockConfig {
    /// "system" | "manual".
    #[serde(default)]
    pub mode: ClockMode,
    /// Initial time of the manual clock.
    #[serde(default)]
    pub start: Timestamp,
}

/// A funded account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub address: String,
    #[serde(default)]
    pub balance: u64,
    /// Amount the account approves the ledger to pull.
    #[serde(default)]
    pub allowance: u64,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// CBOR snapshot loaded on start and written on shutdown. Empty = none.
    #[serde(default)]
    pub snapshot_path: String,
}

// Default value functions

fn default_epoch_length() -> Timestamp {
    24 * 60 * 60
}

fn default_beneficiary() -> String {
    "0x0000000000000000000000000000000000000001".to_string()
}

fn default_ledger_address() -> String {
    "0x00000000000000000000000000000000000000ff".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            epoch_length: default_epoch_length(),
            beneficiary: default_beneficiary(),
            ledger_address: default_ledger_address(),
            recurring_payments: String::new(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            snapshot_path: String::new(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load and validate configuration from `path`.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.ledger.epoch_length > 0,
            "ledger.epoch_length must be positive, got {}",
            self.ledger.epoch_length
        );
        self.engine_config()?;
        for account in &self.accounts {
            parse_address(&account.address, "accounts.address")?;
        }
        Ok(())
    }

    /// Engine construction parameters.
    pub fn engine_config(&self) -> anyhow::Result<SubscriptionsConfig> {
        let recurring_payments = if self.ledger.recurring_payments.is_empty() {
            Address::ZERO
        } else {
            parse_address(&self.ledger.recurring_payments, "ledger.recurring_payments")?
        };
        Ok(SubscriptionsConfig {
            epoch_length: self.ledger.epoch_length,
            ledger_address: parse_address(&self.ledger.ledger_address, "ledger.ledger_address")?,
            beneficiary: parse_address(&self.ledger.beneficiary, "ledger.beneficiary")?,
            recurring_payments,
        })
    }

    /// Seed balances as `(address, balance, allowance)`.
    pub fn seed_accounts(&self) -> anyhow::Result<Vec<(Address, Amount, Amount)>> {
        self.accounts
            .iter()
            .map(|account| {
                let address = parse_address(&account.address, "accounts.address")?;
                Ok((
                    address,
                    Amount::from(account.balance),
                    Amount::from(account.allowance),
                ))
            })
            .collect()
    }

    /// Snapshot file, if configured.
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        if self.advanced.snapshot_path.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.advanced.snapshot_path))
        }
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        Self::data_dir().join("config.toml")
    }

    /// Data directory: `$SUBS_DATA_DIR`, else a platform default.
    pub fn data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("SUBS_DATA_DIR") {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/Subs")
        }
        #[cfg(target_os = "windows")]
        {
            dirs_fallback("Subs")
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            dirs_fallback(".subs")
        }
    }
}

fn parse_address(value: &str, field: &str) -> anyhow::Result<Address> {
    value
        .parse()
        .with_context(|| format!("{field}: invalid address {value:?}"))
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/subs"))
}
