//! Transaction log events
//!
//! Defines the record of a single store mutation and the value escaping
//! applied on its way to and from a backend.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::backend::LogRecord;
use crate::error::{LedgerError, Result};

/// Kind of mutation recorded by an [`Event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventType {
    Put = 1,
    Delete = 2,
}

impl EventType {
    /// Numeric code stored by backends
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for EventType {
    type Error = LedgerError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            1 => Ok(EventType::Put),
            2 => Ok(EventType::Delete),
            other => Err(LedgerError::Corruption(format!(
                "unknown event type code: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Put => f.pad("PUT"),
            EventType::Delete => f.pad("DELETE"),
        }
    }
}

/// An immutable record of one accepted store mutation
///
/// `sequence` is assigned by the backend when the event is persisted; events
/// built in memory carry `0` until they are read back from a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    sequence: u64,
    event_type: EventType,
    key: String,
    value: String,
}

impl Event {
    /// A Put of `value` under `key`
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            event_type: EventType::Put,
            key: key.into(),
            value: value.into(),
        }
    }

    /// A Delete of `key`
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            event_type: EventType::Delete,
            key: key.into(),
            value: String::new(),
        }
    }

    /// Decode a stored record, unescaping its value
    ///
    /// The stored value of a Delete is ignored.
    pub fn from_record(record: LogRecord) -> Result<Self> {
        let value = match record.event_type {
            EventType::Put => unescape_value(&record.value)?,
            EventType::Delete => String::new(),
        };

        Ok(Self {
            sequence: record.sequence,
            event_type: record.event_type,
            key: record.key,
            value,
        })
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The value of a Put; empty for a Delete
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Escape a value so it survives transports that are not byte-transparent
///
/// Uses query-string form encoding: spaces become `+`, everything outside
/// `[A-Za-z0-9*-._]` becomes `%XX`.
pub fn escape_value(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Reverse [`escape_value`]
///
/// Only canonical encodings are accepted: anything `escape_value` could not
/// have produced is reported as corruption.
pub fn unescape_value(escaped: &str) -> Result<String> {
    let value = form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(decoded, _)| decoded)
        .unwrap_or(Cow::Borrowed(""))
        .into_owned();

    if escape_value(&value) != escaped {
        return Err(LedgerError::Corruption(format!(
            "value is not canonically escaped: {:?}",
            escaped
        )));
    }

    Ok(value)
}
