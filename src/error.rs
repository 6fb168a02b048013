//! Error types for LedgerKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using LedgerError
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Unified error type for LedgerKV operations
#[derive(Debug, Error)]
pub enum LedgerError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("no such key")]
    KeyNotFound,

    #[error("invalid key: {0}")]
    InvalidKey(String),

    // -------------------------------------------------------------------------
    // Backend Errors
    // -------------------------------------------------------------------------
    /// The backend could not be opened or did not answer its liveness check.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("log corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Transaction Log Errors
    // -------------------------------------------------------------------------
    /// An append failed after the event left the queue. The store keeps the
    /// mutation; the log has a durability gap.
    #[error("transaction log write failed: {0}")]
    WriteFailure(String),

    #[error("transaction log replay failed: {0}")]
    ReplayFailure(String),

    /// A write was issued after the logger was closed.
    #[error("transaction logger is closed")]
    Closed,

    #[error("timed out: {0}")]
    Timeout(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        LedgerError::Backend(e.to_string())
    }
}

impl From<bincode::Error> for LedgerError {
    fn from(e: bincode::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(e: reqwest::Error) -> Self {
        LedgerError::Network(e.to_string())
    }
}

impl LedgerError {
    /// Wrap any error raised while reading the log at startup.
    ///
    /// Errors that already describe a replay failure are passed through.
    pub fn into_replay_failure(self) -> Self {
        match self {
            LedgerError::ReplayFailure(_) | LedgerError::Timeout(_) => self,
            other => LedgerError::ReplayFailure(other.to_string()),
        }
    }
}
