//! Configuration file support for the wallet sync service.
//!
//! Loads optional `wallet-sync.toml` from the data directory. If no config
//! file exists, defaults are used; a malformed file logs a warning and falls
//! back to defaults rather than refusing to start.

use crate::currency::{CoinKind, Denomination};

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct WalletSyncConfig {
    pub storage: StorageConfig,
    pub display: DisplayConfig,
}

/// Persistence configuration section.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Mirror directory for cloud backup; `None` disables mirroring.
    pub cloud_backup_dir: Option<String>,
    /// Quiet window in seconds between the last wallet mutation and a save.
    pub save_delay_secs: u64,
    pub save_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: "./wallet-data".into(),
            cloud_backup_dir: None,
            save_delay_secs: 2,
            save_enabled: true,
        }
    }
}

impl StorageConfig {
    pub fn save_delay(&self) -> Duration {
        Duration::from_secs(self.save_delay_secs)
    }
}

/// Display configuration section.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Index into the currency catalog; persisted across versions, so the
    /// catalog order is append-only.
    pub currency_index: usize,
    pub coin: CoinKind,
    pub denomination: Denomination,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            // USD
            currency_index: 20,
            coin: CoinKind::Bitcoin,
            denomination: Denomination::Coin,
        }
    }
}

impl WalletSyncConfig {
    /// Load configuration from `wallet-sync.toml` in the given directory.
    /// Returns `Default` if the file doesn't exist.
    pub fn load(data_dir: &Path) -> Self {
        let config_path = data_dir.join("wallet-sync.toml");
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse {}: {}, using defaults",
                        config_path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}
