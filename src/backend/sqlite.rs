//! SQLite backend
//!
//! Stores events as rows of a `transactions` table; the integer primary key
//! is the event sequence.

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OpenFlags};

use crate::error::{LedgerError, Result};
use crate::translog::EventType;

use super::{Backend, LogRecord};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS transactions (
    sequence   INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type INTEGER NOT NULL,
    key        TEXT    NOT NULL,
    value      TEXT    NOT NULL DEFAULT ''
)";

const INSERT_EVENT: &str = "INSERT INTO transactions (event_type, key, value) VALUES (?1, ?2, ?3)";

const SELECT_EVENTS: &str =
    "SELECT sequence, event_type, key, value FROM transactions ORDER BY sequence";

/// Backend holding the log in a SQLite database
pub struct SqliteBackend {
    /// `None` once closed
    conn: Option<Connection>,
}

impl SqliteBackend {
    /// Open (or create) the database at `path`, ping it and provision the
    /// `transactions` table
    pub fn open(path: &Path, busy_timeout_ms: u64) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            LedgerError::BackendUnavailable(format!(
                "cannot open database {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::init(conn, busy_timeout_ms).map_err(|e| {
            LedgerError::BackendUnavailable(format!(
                "database {} failed initialization: {}",
                path.display(),
                e
            ))
        })
    }

    /// Open an existing database without writing to it
    ///
    /// The file is never created and the table is never provisioned; a
    /// database without a `transactions` table fails the first scan.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            LedgerError::BackendUnavailable(format!(
                "cannot open database {}: {}",
                path.display(),
                e
            ))
        })?;

        let one: i64 = conn
            .query_row("SELECT 1", [], |row| row.get(0))
            .map_err(|e| LedgerError::BackendUnavailable(e.to_string()))?;
        if one != 1 {
            return Err(LedgerError::BackendUnavailable(
                "database ping returned an unexpected result".to_string(),
            ));
        }

        Ok(Self { conn: Some(conn) })
    }

    /// Private in-memory database; history does not outlive the backend
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LedgerError::BackendUnavailable(e.to_string()))?;
        Self::init(conn, 0)
    }

    fn init(conn: Connection, busy_timeout_ms: u64) -> Result<Self> {
        // Liveness check
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        if one != 1 {
            return Err(LedgerError::BackendUnavailable(
                "database ping returned an unexpected result".to_string(),
            ));
        }

        // In-memory databases report "memory", which is acceptable
        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        if journal_mode != "wal" && journal_mode != "memory" {
            tracing::warn!(journal_mode = %journal_mode, "database is not in WAL mode");
        }

        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
        conn.execute_batch(CREATE_TABLE)?;

        Ok(Self { conn: Some(conn) })
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| LedgerError::Backend("database connection is closed".to_string()))
    }
}

impl Backend for SqliteBackend {
    fn append(&mut self, event_type: EventType, key: &str, value: &str) -> Result<u64> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(INSERT_EVENT)?;
        stmt.execute(params![event_type.code(), key, value])?;

        let sequence = conn.last_insert_rowid();
        u64::try_from(sequence)
            .map_err(|_| LedgerError::Backend(format!("negative sequence {}", sequence)))
    }

    fn scan(&mut self, visit: &mut dyn FnMut(LogRecord) -> Result<()>) -> Result<()> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(SELECT_EVENTS)?;
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            let sequence: i64 = row.get(0)?;
            let code: u8 = row.get(1)?;

            let record = LogRecord {
                sequence: u64::try_from(sequence).map_err(|_| {
                    LedgerError::Corruption(format!("negative sequence {}", sequence))
                })?,
                event_type: EventType::try_from(code)?,
                key: row.get(2)?,
                value: row.get(3)?,
            };

            visit(record)?;
        }

        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| LedgerError::from(e))?;
        }
        Ok(())
    }
}
