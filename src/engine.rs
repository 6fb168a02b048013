//! Engine Module
//!
//! Process layer tying the store to the transaction log.
//!
//! ## Responsibilities
//! - Open the backend and build the logger
//! - Replay the stored history before accepting traffic
//! - Apply live mutations to the store, then hand them to the logger
//! - Report asynchronous write failures
//! - Drain the log on shutdown

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::{self, Backend};
use crate::config::Config;
use crate::error::{LedgerError, Result};
use crate::store::Store;
use crate::translog::{recovery, LoggerOptions, ReplayStats, TransactionLogger};

/// The main engine
///
/// ## Startup
/// 1. Open the backend (fails fast when unreachable)
/// 2. Replay every stored event onto an empty store, bypassing the logger
/// 3. Start the log writer
/// 4. Start the write-failure monitor
///
/// Any failure before step 3 aborts startup: the engine never serves a
/// partially replayed store.
///
/// ## Mutations
/// The store is updated first. Only a successful mutation is logged, and a
/// later append failure never undoes it.
///
/// Mutations are serialized: the store update and the enqueue of its event
/// happen under one lock, so the log order matches the order in which the
/// store saw the mutations. Reads never take this lock.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// In-memory key-value map (internal RwLock)
    store: Store,

    /// Transaction log
    logger: Arc<TransactionLogger>,

    /// Outcome of the startup replay
    replay_stats: ReplayStats,

    /// Held across a store mutation and the enqueue of its event
    mutation_lock: Mutex<()>,

    /// Thread logging write failures until the writer stops
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Open the backend named by `config` and start the engine
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let backend = backend::open_backend(&config.backend)?;
        Self::with_backend(config, backend)
    }

    /// Start the engine on an already opened backend
    ///
    /// `config.backend` is ignored.
    pub fn with_backend(config: Config, backend: Box<dyn Backend>) -> Result<Self> {
        config.validate()?;

        let store = Store::new();
        let logger = Arc::new(TransactionLogger::new(backend, LoggerOptions::from(&config)));

        let replay_stats = recovery::replay(&logger, &store, config.replay_timeout())?;

        logger.run()?;
        let monitor = spawn_monitor(&logger)?;

        Ok(Self {
            config,
            store,
            logger,
            replay_stats,
            mutation_lock: Mutex::new(()),
            monitor: Mutex::new(Some(monitor)),
        })
    }

    /// Get a value by key
    ///
    /// Returns `KeyNotFound` if the key is absent.
    pub fn get(&self, key: &str) -> Result<String> {
        self.store.get(key)
    }

    /// Put a key-value pair
    ///
    /// Steps:
    /// 1. Take the mutation lock
    /// 2. Write to the store
    /// 3. Enqueue a Put event (may block while the write queue is full)
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.mutation_lock.lock();
        self.store.put(key, value)?;
        self.logger.write_put(key, value)
    }

    /// Delete a key
    ///
    /// Steps:
    /// 1. Take the mutation lock
    /// 2. Remove from the store
    /// 3. Enqueue a Delete event
    pub fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.mutation_lock.lock();
        self.store.delete(key)?;
        self.logger.write_delete(key)
    }

    /// Block until every logged mutation so far has reached the backend
    pub fn sync(&self) {
        self.logger.wait();
    }

    /// Close the engine gracefully
    ///
    /// Drains the write queue within `config.shutdown_timeout_ms` and closes
    /// the backend.
    pub fn close(&self) -> Result<()> {
        self.close_with_timeout(self.config.shutdown_timeout())
    }

    /// [`close`](Self::close) with an explicit deadline
    pub fn close_with_timeout(&self, timeout: Duration) -> Result<()> {
        self.logger.close(timeout)?;

        // The failure stream disconnects once the writer has stopped
        if let Some(monitor) = self.monitor.lock().take() {
            monitor.join().map_err(|_| {
                LedgerError::Backend("write-failure monitor panicked".to_string())
            })?;
        }

        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the in-memory store
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Get the transaction logger
    pub fn logger(&self) -> &Arc<TransactionLogger> {
        &self.logger
    }

    /// Get the startup replay statistics
    pub fn replay_stats(&self) -> ReplayStats {
        self.replay_stats
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Log every write failure as a durability gap
fn spawn_monitor(logger: &TransactionLogger) -> Result<JoinHandle<()>> {
    let failures = logger.err();

    let handle = thread::Builder::new()
        .name("ledgerkv-log-monitor".to_string())
        .spawn(move || {
            let mut count = 0u64;
            for failure in failures.iter() {
                count += 1;
                tracing::error!(error = %failure, count, "mutation applied but not logged");
            }
        })?;

    Ok(handle)
}
