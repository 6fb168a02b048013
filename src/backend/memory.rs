//! In-memory backend
//!
//! Keeps records in a shared vector. Clones share the same records, so a
//! history written through one handle can be replayed through another the
//! way a restarted process would see it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{LedgerError, Result};
use crate::translog::EventType;

use super::{Backend, LogRecord};

#[derive(Default)]
struct Shared {
    records: Mutex<Vec<LogRecord>>,
    fail_appends: AtomicBool,
    closed: AtomicBool,
}

/// Backend that never leaves the process
#[derive(Clone, Default)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the backend with raw records, bypassing sequence assignment
    pub fn with_records(records: Vec<LogRecord>) -> Self {
        let backend = Self::new();
        *backend.shared.records.lock() = records;
        backend
    }

    /// Make every subsequent append fail until switched back off
    pub fn set_fail_appends(&self, fail: bool) {
        self.shared.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Copy of every stored record, in sequence order
    pub fn records(&self) -> Vec<LogRecord> {
        self.shared.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.shared.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether some handle has been closed
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl Backend for MemoryBackend {
    fn append(&mut self, event_type: EventType, key: &str, value: &str) -> Result<u64> {
        if self.shared.fail_appends.load(Ordering::SeqCst) {
            return Err(LedgerError::Backend("append rejected".to_string()));
        }

        let mut records = self.shared.records.lock();
        let sequence = records.last().map(|r| r.sequence + 1).unwrap_or(1);
        records.push(LogRecord {
            sequence,
            event_type,
            key: key.to_string(),
            value: value.to_string(),
        });

        Ok(sequence)
    }

    fn scan(&mut self, visit: &mut dyn FnMut(LogRecord) -> Result<()>) -> Result<()> {
        // Visit one record at a time so the lock is never held across `visit`
        let mut index = 0;
        loop {
            let record = match self.shared.records.lock().get(index) {
                Some(record) => record.clone(),
                None => return Ok(()),
            };
            visit(record)?;
            index += 1;
        }
    }

    fn close(&mut self) -> Result<()> {
        self.shared.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
