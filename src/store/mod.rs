//! Store Module
//!
//! The in-memory key-value map served over HTTP.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Many concurrent readers, one writer at a time
//! - Target of both live mutations and startup replay
//!
//! ## Data Structure Choice
//! A `HashMap` behind a `parking_lot::RwLock`. Deletes remove the entry
//! outright; the transaction log is the only history.

mod table;

pub use table::Store;
