//! Configuration for LedgerKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{LedgerError, Result};

/// Main configuration for a LedgerKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Backend Configuration
    // -------------------------------------------------------------------------
    /// Where the transaction log is persisted
    pub backend: BackendConfig,

    // -------------------------------------------------------------------------
    // Transaction Logger Configuration
    // -------------------------------------------------------------------------
    /// Capacity of the write queue; producers block once it is full
    pub queue_capacity: usize,

    /// Capacity of the write-failure stream
    pub error_capacity: usize,

    /// Number of events buffered between the replay scan and its consumer
    pub replay_buffer: usize,

    /// Deadline for the startup replay drain (milliseconds)
    pub replay_timeout_ms: u64,

    /// Deadline for draining the write queue on shutdown (milliseconds)
    pub shutdown_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// HTTP listen address
    pub listen_addr: String,
}

/// Persistence backend selection
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// Append-only, checksummed log file
    File { path: PathBuf, sync: SyncStrategy },

    /// SQLite database holding a `transactions` table
    Sqlite { path: PathBuf, busy_timeout_ms: u64 },
}

/// Log file sync strategy
#[derive(Debug, Clone, Copy)]
pub enum SyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::File {
            path: PathBuf::from("./ledgerkv_data/transactions.log"),
            sync: SyncStrategy::EveryWrite,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            queue_capacity: 16,
            error_capacity: 64,
            replay_buffer: 64,
            replay_timeout_ms: 60_000,
            shutdown_timeout_ms: 10_000,
            listen_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn replay_timeout(&self) -> Duration {
        Duration::from_millis(self.replay_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Reject settings the logger cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(LedgerError::Config(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.error_capacity == 0 {
            return Err(LedgerError::Config(
                "error_capacity must be at least 1".to_string(),
            ));
        }
        if self.replay_buffer == 0 {
            return Err(LedgerError::Config(
                "replay_buffer must be at least 1".to_string(),
            ));
        }
        if let BackendConfig::File {
            sync: SyncStrategy::EveryNEntries { count: 0 },
            ..
        } = self.backend
        {
            return Err(LedgerError::Config(
                "sync count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the persistence backend
    pub fn backend(mut self, backend: BackendConfig) -> Self {
        self.config.backend = backend;
        self
    }

    /// Use a log file backend at `path`
    pub fn log_file(mut self, path: impl Into<PathBuf>, sync: SyncStrategy) -> Self {
        self.config.backend = BackendConfig::File {
            path: path.into(),
            sync,
        };
        self
    }

    /// Use a SQLite backend at `path`
    pub fn sqlite(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.backend = BackendConfig::Sqlite {
            path: path.into(),
            busy_timeout_ms: 5_000,
        };
        self
    }

    /// Set the write queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set the write-failure stream capacity
    pub fn error_capacity(mut self, capacity: usize) -> Self {
        self.config.error_capacity = capacity;
        self
    }

    /// Set the replay buffer size
    pub fn replay_buffer(mut self, size: usize) -> Self {
        self.config.replay_buffer = size;
        self
    }

    /// Set the replay deadline (in milliseconds)
    pub fn replay_timeout_ms(mut self, ms: u64) -> Self {
        self.config.replay_timeout_ms = ms;
        self
    }

    /// Set the shutdown drain deadline (in milliseconds)
    pub fn shutdown_timeout_ms(mut self, ms: u64) -> Self {
        self.config.shutdown_timeout_ms = ms;
        self
    }

    /// Set the HTTP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
