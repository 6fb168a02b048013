//! # LedgerKV
//!
//! An HTTP key-value store whose every mutation is recorded in a durable,
//! replayable transaction log:
//! - Asynchronous, ordered write pipeline with backpressure
//! - Startup replay that rebuilds the store before traffic is accepted
//! - Write failures reported out-of-band, never failing the caller
//! - Pluggable backends: log file, SQLite, in-memory
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Server                             │
//! │                  PUT / GET / DELETE /v1/{key}                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Engine                                 │
//! │             (store first, then transaction log)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌──────────────────┐
//!   │    Store    │  replay  │ TransactionLogger│
//!   │  (RwLock)   │◀─────────│ (queue + writer) │
//!   └─────────────┘          └────────┬─────────┘
//!                                     │
//!                                     ▼
//!                             ┌─────────────┐
//!                             │   Backend   │
//!                             │ file/sqlite │
//!                             └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod translog;
pub mod backend;
pub mod store;
pub mod http;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LedgerError, Result};
pub use config::Config;
pub use engine::Engine;
pub use translog::{Event, EventType, TransactionLogger};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of LedgerKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
