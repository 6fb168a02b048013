//! Persistence Backend Module
//!
//! Durable append/scan storage underneath the transaction logger.
//!
//! ## Contract
//! - `append` persists one `(event_type, key, escaped_value)` tuple and
//!   returns the sequence number assigned to it
//! - `scan` visits every stored record in ascending sequence order without
//!   materializing the whole history
//! - Construction opens the backend, provisions its schema and performs a
//!   liveness check; failures surface as `BackendUnavailable`
//!
//! Values handed to a backend are already escaped by the logger, so a
//! backend never needs to be byte-transparent.

mod file;
mod memory;
mod sqlite;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use crate::config::BackendConfig;
use crate::error::Result;
use crate::translog::EventType;

/// A record as stored by a backend (value still escaped)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Backend-assigned, strictly increasing in write order
    pub sequence: u64,

    pub event_type: EventType,

    pub key: String,

    /// Escaped value; empty for deletes
    pub value: String,
}

/// Storage engine the transaction logger writes through
///
/// Implementations are owned by exactly one logger and are only ever driven
/// from one thread at a time.
pub trait Backend: Send {
    /// Durably append one record, returning its assigned sequence
    fn append(&mut self, event_type: EventType, key: &str, value: &str) -> Result<u64>;

    /// Visit all records in ascending sequence order
    ///
    /// An error returned by `visit` stops the scan and is returned as-is.
    fn scan(&mut self, visit: &mut dyn FnMut(LogRecord) -> Result<()>) -> Result<()>;

    /// Flush and release the underlying resources
    fn close(&mut self) -> Result<()>;
}

/// Open the backend described by `config`
pub fn open_backend(config: &BackendConfig) -> Result<Box<dyn Backend>> {
    match config {
        BackendConfig::File { path, sync } => {
            let backend = FileBackend::open(path, *sync)?;
            Ok(Box::new(backend))
        }
        BackendConfig::Sqlite {
            path,
            busy_timeout_ms,
        } => {
            let backend = SqliteBackend::open(path, *busy_timeout_ms)?;
            Ok(Box::new(backend))
        }
    }
}

/// Open the backend described by `config` for inspection only
///
/// Missing logs are reported as unavailable rather than created, and nothing
/// on disk is modified. Appends through the returned backend fail.
pub fn open_backend_read_only(config: &BackendConfig) -> Result<Box<dyn Backend>> {
    match config {
        BackendConfig::File { path, .. } => Ok(Box::new(FileBackend::open_read_only(path)?)),
        BackendConfig::Sqlite { path, .. } => Ok(Box::new(SqliteBackend::open_read_only(path)?)),
    }
}
