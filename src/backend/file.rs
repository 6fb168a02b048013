//! Log file backend
//!
//! Append-only file of checksummed records.
//!
//! ## File Format
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │ Record 1                                          │
//! │ ┌─────────┬─────────┬──────────┬─────────┬──────┐ │
//! │ │ LSN (8) │ Len (4) │ HCRC (4) │ CRC (4) │ Data │ │
//! │ └─────────┴─────────┴──────────┴─────────┴──────┘ │
//! ├───────────────────────────────────────────────────┤
//! │ Record 2                                          │
//! │ ┌─────────┬─────────┬──────────┬─────────┬──────┐ │
//! │ │ LSN (8) │ Len (4) │ HCRC (4) │ CRC (4) │ Data │ │
//! │ └─────────┴─────────┴──────────┴─────────┴──────┘ │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! - LSN doubles as the event sequence number
//! - HCRC covers LSN and Len; Len is never trusted before it checks out
//! - CRC covers the LSN bytes and the data
//! - Data is the bincode encoding of `(event_type, key, value)`
//!
//! ## Recovery
//! An append writes a prefix of its frame at worst, so only the physical tail
//! may be damaged by a crash. The tail is truncated when it is a short frame,
//! a frame whose data fails its CRC, or a zero-filled region. Any other bad
//! frame is corruption and the log is not opened.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::config::SyncStrategy;
use crate::error::{LedgerError, Result};
use crate::translog::EventType;

use super::{Backend, LogRecord};

/// LSN (8) + Len (4) + HCRC (4) + CRC (4)
const HEADER_SIZE: usize = 20;

/// Bytes covered by the header checksum
const HEADER_CHECKED: usize = 12;

/// Largest record payload accepted on read (16 MB)
const MAX_RECORD_SIZE: u32 = 16 * 1024 * 1024;

#[derive(Serialize)]
struct PayloadRef<'a> {
    event_type: EventType,
    key: &'a str,
    value: &'a str,
}

#[derive(Deserialize)]
struct Payload {
    event_type: EventType,
    key: String,
    value: String,
}

/// Outcome of reading one frame from the log
enum Frame {
    Record { record: LogRecord, size: u64 },
    Eof,
    /// The file ends in the middle of a frame
    Torn,
    /// A header that fails its checksum; the frame size is unknown
    BadHeader { reason: String },
    /// A complete frame whose data does not check out
    Invalid { reason: String, size: u64 },
}

/// Backend writing to a single append-only log file
pub struct FileBackend {
    path: PathBuf,

    /// Append handle; `None` once closed
    file: Option<File>,

    /// Length of the valid prefix of the file
    len: u64,

    next_lsn: u64,

    sync_strategy: SyncStrategy,

    /// Appends since the last fsync
    unsynced: usize,
}

impl FileBackend {
    /// Open or create the log at `path`
    ///
    /// Existing records are verified to find the next LSN. A torn final
    /// record (crash mid-append) is truncated away; damage anywhere else is
    /// reported as corruption.
    pub fn open(path: &Path, sync_strategy: SyncStrategy) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                LedgerError::BackendUnavailable(format!(
                    "cannot create log directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(|e| {
                LedgerError::BackendUnavailable(format!(
                    "cannot open log file {}: {}",
                    path.display(),
                    e
                ))
            })?;

        let file_len = file.metadata()?.len();
        let (valid_len, last_lsn) = recover(path, file_len)?;

        if valid_len < file_len {
            tracing::warn!(
                path = %path.display(),
                discarded = file_len - valid_len,
                "truncating torn record at end of transaction log"
            );
            file.set_len(valid_len)?;
            file.sync_data()?;
        }

        tracing::debug!(path = %path.display(), last_lsn, "opened transaction log file");

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            len: valid_len,
            next_lsn: last_lsn + 1,
            sync_strategy,
            unsynced: 0,
        })
    }

    /// Open an existing log for reading only
    ///
    /// Nothing is created or truncated: a missing file is unavailable, and a
    /// torn tail is left on disk and skipped by `scan`. Appends fail.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path).map_err(|e| {
            LedgerError::BackendUnavailable(format!(
                "cannot open log file {}: {}",
                path.display(),
                e
            ))
        })?;
        if !metadata.is_file() {
            return Err(LedgerError::BackendUnavailable(format!(
                "{} is not a log file",
                path.display()
            )));
        }
        let file_len = metadata.len();

        let (valid_len, last_lsn) = recover(path, file_len)?;
        if valid_len < file_len {
            tracing::warn!(
                path = %path.display(),
                ignored = file_len - valid_len,
                "ignoring torn record at end of transaction log"
            );
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: None,
            len: valid_len,
            next_lsn: last_lsn + 1,
            sync_strategy: SyncStrategy::EveryWrite,
            unsynced: 0,
        })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// LSN that the next append will receive
    pub fn next_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Appends not yet covered by an fsync
    pub fn unsynced_count(&self) -> usize {
        self.unsynced
    }

    fn sync(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.sync_data()?;
        }
        self.unsynced = 0;
        Ok(())
    }
}

impl Backend for FileBackend {
    fn append(&mut self, event_type: EventType, key: &str, value: &str) -> Result<u64> {
        let lsn = self.next_lsn;
        let frame = encode_frame(lsn, event_type, key, value)?;

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| LedgerError::Backend("log file is not open for writing".to_string()))?;

        if let Err(e) = file.write_all(&frame) {
            // Drop whatever part of the frame made it out so the next append
            // does not land behind garbage
            let _ = file.set_len(self.len);
            return Err(e.into());
        }

        self.len += frame.len() as u64;
        self.next_lsn += 1;
        self.unsynced += 1;

        let should_sync = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNEntries { count } => self.unsynced >= count,
        };
        if should_sync {
            self.sync()?;
        }

        Ok(lsn)
    }

    fn scan(&mut self, visit: &mut dyn FnMut(LogRecord) -> Result<()>) -> Result<()> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut offset = 0u64;

        while offset < self.len {
            match read_frame(&mut reader)? {
                Frame::Record { record, size } => {
                    offset += size;
                    visit(record)?;
                }
                Frame::Eof | Frame::Torn => {
                    return Err(LedgerError::Corruption(format!(
                        "log ends at offset {}, expected {} bytes",
                        offset, self.len
                    )));
                }
                Frame::BadHeader { reason } | Frame::Invalid { reason, .. } => {
                    return Err(LedgerError::Corruption(format!(
                        "{} at offset {}",
                        reason, offset
                    )));
                }
            }
        }

        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.file.is_some() {
            self.sync()?;
            self.file = None;
        }
        Ok(())
    }
}

/// Walk the file, returning the valid length and the last LSN
fn recover(path: &Path, file_len: u64) -> Result<(u64, u64)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut offset = 0u64;
    let mut last_lsn = 0u64;

    let corruption = |reason: String, offset: u64| {
        LedgerError::Corruption(format!("{} at offset {} in {}", reason, offset, path.display()))
    };

    loop {
        match read_frame(&mut reader)? {
            Frame::Record { record, size } => {
                if record.sequence <= last_lsn {
                    return Err(LedgerError::Corruption(format!(
                        "LSN {} follows LSN {} at offset {}",
                        record.sequence, last_lsn, offset
                    )));
                }
                last_lsn = record.sequence;
                offset += size;
            }
            // Len has been verified, so a short frame really is the tail
            Frame::Eof | Frame::Torn => return Ok((offset, last_lsn)),
            Frame::Invalid { size, .. } if offset + size == file_len => {
                // Final record was only partially flushed
                return Ok((offset, last_lsn));
            }
            Frame::BadHeader { reason } => {
                if is_zeroed_from(path, offset)? {
                    return Ok((offset, last_lsn));
                }
                return Err(corruption(reason, offset));
            }
            Frame::Invalid { reason, .. } => return Err(corruption(reason, offset)),
        }
    }
}

/// Whether every byte from `offset` to the end of the file is zero
fn is_zeroed_from(path: &Path, offset: u64) -> Result<bool> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut reader = BufReader::new(file);

    let mut buf = [0u8; 4096];
    loop {
        let n = read_full(&mut reader, &mut buf)?;
        if buf[..n].iter().any(|&b| b != 0) {
            return Ok(false);
        }
        if n < buf.len() {
            return Ok(true);
        }
    }
}

/// Encode one record as header + payload
fn encode_frame(lsn: u64, event_type: EventType, key: &str, value: &str) -> Result<BytesMut> {
    let payload = bincode::serialize(&PayloadRef {
        event_type,
        key,
        value,
    })?;

    if payload.len() > MAX_RECORD_SIZE as usize {
        return Err(LedgerError::Serialization(format!(
            "record too large: {} bytes (max {})",
            payload.len(),
            MAX_RECORD_SIZE
        )));
    }

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    frame.put_u64(lsn);
    frame.put_u32(payload.len() as u32);
    let header_crc = crc32fast::hash(&frame[..HEADER_CHECKED]);
    frame.put_u32(header_crc);
    frame.put_u32(checksum(lsn, &payload));
    frame.put_slice(&payload);

    Ok(frame)
}

fn checksum(lsn: u64, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&lsn.to_be_bytes());
    hasher.update(payload);
    hasher.finalize()
}

/// Read the next frame from `reader`
fn read_frame(reader: &mut impl Read) -> Result<Frame> {
    let mut header = [0u8; HEADER_SIZE];
    match read_full(reader, &mut header)? {
        0 => return Ok(Frame::Eof),
        n if n < HEADER_SIZE => return Ok(Frame::Torn),
        _ => {}
    }

    let mut lsn_bytes = [0u8; 8];
    lsn_bytes.copy_from_slice(&header[0..8]);
    let lsn = u64::from_be_bytes(lsn_bytes);
    let len = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
    let header_crc = u32::from_be_bytes([header[12], header[13], header[14], header[15]]);
    let crc = u32::from_be_bytes([header[16], header[17], header[18], header[19]]);

    if crc32fast::hash(&header[..HEADER_CHECKED]) != header_crc {
        return Ok(Frame::BadHeader {
            reason: "header checksum mismatch".to_string(),
        });
    }

    if len > MAX_RECORD_SIZE {
        return Ok(Frame::BadHeader {
            reason: format!("record length {} exceeds maximum", len),
        });
    }

    let mut payload = vec![0u8; len as usize];
    if read_full(reader, &mut payload)? < payload.len() {
        return Ok(Frame::Torn);
    }

    let size = (HEADER_SIZE + payload.len()) as u64;

    if checksum(lsn, &payload) != crc {
        return Ok(Frame::Invalid {
            reason: format!("checksum mismatch for LSN {}", lsn),
            size,
        });
    }

    let decoded: Payload = match bincode::deserialize(&payload) {
        Ok(p) => p,
        Err(e) => {
            return Ok(Frame::Invalid {
                reason: format!("undecodable record {}: {}", lsn, e),
                size,
            })
        }
    };

    Ok(Frame::Record {
        record: LogRecord {
            sequence: lsn,
            event_type: decoded.event_type,
            key: decoded.key,
            value: decoded.value,
        },
        size,
    })
}

/// Fill `buf` as far as the reader allows, returning the bytes read
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
