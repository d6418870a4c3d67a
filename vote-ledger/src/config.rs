//! Configuration for the vote ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Highest difficulty a SHA-256 hex digest can satisfy
pub const MAX_DIFFICULTY: u32 = 64;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Required count of leading hex zeros in a sealed block hash
    pub difficulty: u32,

    /// Actor mailbox capacity
    pub mailbox_capacity: usize,

    /// Re-verify the whole chain when reopening persisted state
    pub verify_on_open: bool,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Sealing configuration
    pub sealing: SealingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "vote-ledger".to_string(),
            difficulty: 4,
            mailbox_capacity: 1000,
            verify_on_open: true,
            storage: StorageConfig::default(),
            sealing: SealingConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Persist blocks and the pending pool
    pub enabled: bool,

    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// fsync every write batch
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            data_dir: PathBuf::from("./data/vote-ledger"),
            write_buffer_size_mb: 64,
            max_background_jobs: 2,
            sync_writes: true,
        }
    }
}

/// Automatic sealing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SealingConfig {
    /// Seal without an explicit `mine_block` request
    pub auto_seal: bool,

    /// Seal interval (milliseconds)
    pub seal_interval_ms: u64,

    /// Seal as soon as the pool holds this many votes
    pub max_pending_votes: usize,
}

impl Default for SealingConfig {
    fn default() -> Self {
        Self {
            auto_seal: false,
            seal_interval_ms: 5_000,
            max_pending_votes: 100,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(difficulty) = std::env::var("VOTE_LEDGER_DIFFICULTY") {
            config.difficulty = difficulty.parse().map_err(|e| {
                crate::Error::Config(format!("VOTE_LEDGER_DIFFICULTY: {}", e))
            })?;
        }

        if let Ok(data_dir) = std::env::var("VOTE_LEDGER_DATA_DIR") {
            config.storage.enabled = true;
            config.storage.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(interval) = std::env::var("VOTE_LEDGER_SEAL_INTERVAL_MS") {
            config.sealing.auto_seal = true;
            config.sealing.seal_interval_ms = interval.parse().map_err(|e| {
                crate::Error::Config(format!("VOTE_LEDGER_SEAL_INTERVAL_MS: {}", e))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the ledger cannot honour
    pub fn validate(&self) -> crate::Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(crate::Error::Config(format!(
                "difficulty {} exceeds {}",
                self.difficulty, MAX_DIFFICULTY
            )));
        }
        if self.mailbox_capacity == 0 {
            return Err(crate::Error::Config("mailbox_capacity must be > 0".into()));
        }
        if self.sealing.auto_seal && self.sealing.seal_interval_ms == 0 {
            return Err(crate::Error::Config("seal_interval_ms must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "vote-ledger");
        assert_eq!(config.difficulty, 4);
        assert!(!config.storage.enabled);
        assert!(!config.sealing.auto_seal);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            difficulty = 2

            [sealing]
            auto_seal = true
            "#,
        )
        .unwrap();

        assert_eq!(config.difficulty, 2);
        assert!(config.sealing.auto_seal);
        assert_eq!(config.sealing.max_pending_votes, 100);
        assert_eq!(config.mailbox_capacity, 1000);
    }

    #[test]
    fn test_difficulty_out_of_range() {
        let config = Config {
            difficulty: 65,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }
}
