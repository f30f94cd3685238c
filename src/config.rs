//! Runtime configuration.
//!
//! `WalletConfig` is read from the JSON file named by `SPV_WALLET_CONFIG`; every field has a
//! default, so a partial file (or no file at all) is fine.

use crate::ledger::address::{DEFAULT_EXTERNAL_GAP_LIMIT, DEFAULT_INTERNAL_GAP_LIMIT};
use crate::ledger::selection::DEFAULT_FEE_PER_KB;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the path of the JSON config file.
pub const CONFIG_ENV_VAR: &str = "SPV_WALLET_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Fee policy and gap limits of a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub fee_per_kb: u64,
    pub external_gap_limit: u32,
    pub internal_gap_limit: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            fee_per_kb: DEFAULT_FEE_PER_KB,
            external_gap_limit: DEFAULT_EXTERNAL_GAP_LIMIT,
            internal_gap_limit: DEFAULT_INTERNAL_GAP_LIMIT,
        }
    }
}

/// Reconnection and shutdown timing of the sync orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Delay before reconnecting after the gateway reports inactivity.
    pub reconnect_seconds: u64,
    /// Upper bound on how long `stop()` waits for queued notifications.
    pub drain_timeout_ms: u64,
    /// Peers last seen before this unix time are not worth dialing.
    pub earliest_peer_time: u64,
}

impl SyncConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_seconds)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconnect_seconds: 30,
            drain_timeout_ms: 1000,
            earliest_peer_time: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Where the file store keeps its per-chain JSON tables.
    pub data_dir: PathBuf,
    /// Extra `tracing` directives appended to `RUST_LOG`.
    pub log_filter: String,
    pub ledger: LedgerConfig,
    pub sync: SyncConfig,
    /// Hex seed for the watch-only demo account.
    pub demo_seed: Option<String>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("wallet_data"),
            log_filter: "spv_wallet_sync=info".to_string(),
            ledger: LedgerConfig::default(),
            sync: SyncConfig::default(),
            demo_seed: None,
        }
    }
}

impl WalletConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: WalletConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `SPV_WALLET_CONFIG` when set, otherwise fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        use crate::ledger::selection::{MAX_FEE_PER_KB, MIN_FEE_PER_KB};

        if !(MIN_FEE_PER_KB..=MAX_FEE_PER_KB).contains(&self.ledger.fee_per_kb) {
            return Err(ConfigError::Invalid(format!(
                "fee_per_kb {} must be between {} and {}",
                self.ledger.fee_per_kb, MIN_FEE_PER_KB, MAX_FEE_PER_KB
            )));
        }
        if self.ledger.external_gap_limit == 0 {
            return Err(ConfigError::Invalid(
                "external_gap_limit must be at least 1".to_string(),
            ));
        }
        if self.sync.reconnect_seconds == 0 {
            return Err(ConfigError::Invalid(
                "reconnect_seconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
