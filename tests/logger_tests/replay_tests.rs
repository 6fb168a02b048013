//! Tests for reading back and replaying the transaction log
//!
//! These tests verify:
//! - Replay reproduces the state built by direct application
//! - Replaying the same history twice gives the same state
//! - Values with delimiter and control characters survive the log
//! - Out-of-order and corrupt histories abort replay
//! - Abandoned replay streams do not hang the scan

use std::time::Duration;

use ledgerkv::backend::{Backend, FileBackend, LogRecord, MemoryBackend};
use ledgerkv::config::SyncStrategy;
use ledgerkv::store::Store;
use ledgerkv::translog::{self, escape_value, EventType, LoggerOptions, TransactionLogger};
use ledgerkv::LedgerError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const TIMEOUT: Duration = Duration::from_secs(10);

enum Op {
    Put(&'static str, &'static str),
    Delete(&'static str),
}

fn workload() -> Vec<Op> {
    vec![
        Op::Put("a", "1"),
        Op::Put("b", "2"),
        Op::Put("a", "3"),
        Op::Delete("b"),
        Op::Put("c", "x y&z=w"),
        Op::Delete("missing"),
        Op::Put("b", "back"),
        Op::Delete("c"),
        Op::Put("d", ""),
    ]
}

/// Apply `ops` both to a store and through a logger on `backend`
fn record_workload(backend: Box<dyn Backend>, ops: &[Op]) -> Store {
    let store = Store::new();
    let logger = TransactionLogger::new(backend, LoggerOptions::default());
    logger.run().unwrap();

    for op in ops {
        match op {
            Op::Put(k, v) => {
                store.put(k, v).unwrap();
                logger.write_put(k, v).unwrap();
            }
            Op::Delete(k) => {
                store.delete(k).unwrap();
                logger.write_delete(k).unwrap();
            }
        }
    }

    logger.close(TIMEOUT).unwrap();
    store
}

fn replay_into_new_store(backend: Box<dyn Backend>) -> (Store, translog::ReplayStats) {
    let store = Store::new();
    let logger = TransactionLogger::new(backend, LoggerOptions::default());
    let stats = translog::replay(&logger, &store, TIMEOUT).unwrap();
    (store, stats)
}

fn record(sequence: u64, event_type: EventType, key: &str, value: &str) -> LogRecord {
    LogRecord {
        sequence,
        event_type,
        key: key.to_string(),
        value: value.to_string(),
    }
}

// =============================================================================
// Replay Equivalence Tests
// =============================================================================

#[test]
fn test_replay_matches_direct_application() {
    let backend = MemoryBackend::new();
    let expected = record_workload(Box::new(backend.clone()), &workload());

    let (replayed, stats) = replay_into_new_store(Box::new(backend.clone()));

    assert_eq!(replayed.snapshot(), expected.snapshot());
    assert_eq!(stats.events_replayed, 9);
    assert_eq!(stats.puts, 6);
    assert_eq!(stats.deletes, 3);
    assert_eq!(stats.last_sequence, 9);
}

#[test]
fn test_replay_is_idempotent() {
    let backend = MemoryBackend::new();
    record_workload(Box::new(backend.clone()), &workload());

    let (first, _) = replay_into_new_store(Box::new(backend.clone()));
    let (second, _) = replay_into_new_store(Box::new(backend.clone()));

    assert_eq!(first.snapshot(), second.snapshot());
}

#[test]
fn test_replay_empty_log() {
    let (store, stats) = replay_into_new_store(Box::new(MemoryBackend::new()));

    assert!(store.is_empty());
    assert_eq!(stats, translog::ReplayStats::default());
}

#[test]
fn test_file_log_replay_preserves_unsafe_values() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("transactions.log");
    let values = [
        "tab\there",
        "line\nbreak",
        "a,b;c|d",
        "100% + more",
        "ünïcødé ✓",
    ];

    let writer = FileBackend::open(&path, SyncStrategy::EveryWrite).unwrap();
    let logger = TransactionLogger::new(Box::new(writer), LoggerOptions::default());
    logger.run().unwrap();
    for (i, value) in values.iter().enumerate() {
        logger.write_put(&format!("k{}", i), value).unwrap();
    }
    logger.close(TIMEOUT).unwrap();

    let reader = FileBackend::open(&path, SyncStrategy::EveryWrite).unwrap();
    let (store, stats) = replay_into_new_store(Box::new(reader));

    assert_eq!(stats.events_replayed, values.len() as u64);
    for (i, value) in values.iter().enumerate() {
        assert_eq!(store.get(&format!("k{}", i)).unwrap(), *value);
    }
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_out_of_order_sequence_fails_replay() {
    let backend = MemoryBackend::with_records(vec![
        record(1, EventType::Put, "a", "1"),
        record(5, EventType::Put, "b", "2"),
        record(3, EventType::Put, "c", "3"),
    ]);
    let logger = TransactionLogger::new(Box::new(backend), LoggerOptions::default());
    let store = Store::new();

    let result = translog::replay(&logger, &store, TIMEOUT);

    assert!(matches!(result, Err(LedgerError::ReplayFailure(_))));
}

#[test]
fn test_corrupt_value_fails_replay() {
    let backend = MemoryBackend::with_records(vec![
        record(1, EventType::Put, "a", &escape_value("fine")),
        record(2, EventType::Put, "b", "not escaped"),
    ]);
    let logger = TransactionLogger::new(Box::new(backend), LoggerOptions::default());
    let store = Store::new();

    let result = translog::replay(&logger, &store, TIMEOUT);

    assert!(matches!(result, Err(LedgerError::ReplayFailure(_))));
}

#[test]
fn test_visitor_error_aborts_drain() {
    let backend = MemoryBackend::with_records(vec![
        record(1, EventType::Put, "a", "1"),
        record(2, EventType::Put, "b", "2"),
    ]);
    let logger = TransactionLogger::new(Box::new(backend), LoggerOptions::default());
    let (events, errors) = logger.read_events();

    let result = translog::drain(events, errors, TIMEOUT, |_| {
        Err(LedgerError::InvalidKey("rejected".to_string()))
    });

    assert!(matches!(result, Err(LedgerError::ReplayFailure(_))));
}

// =============================================================================
// Stream Tests
// =============================================================================

#[test]
fn test_drain_counts_events_in_order() {
    let backend = MemoryBackend::new();
    record_workload(Box::new(backend.clone()), &workload());

    let logger = TransactionLogger::new(Box::new(backend), LoggerOptions::default());
    let (events, errors) = logger.read_events();

    let mut sequences = Vec::new();
    let count = translog::drain(events, errors, TIMEOUT, |event| {
        sequences.push(event.sequence());
        Ok(())
    })
    .unwrap();

    assert_eq!(count, 9);
    assert_eq!(sequences, (1..=9).collect::<Vec<u64>>());
}

#[test]
fn test_dropped_receivers_abort_scan() {
    let records = (1..=1_000)
        .map(|i| record(i, EventType::Put, &format!("k{}", i), "v"))
        .collect();
    let backend = MemoryBackend::with_records(records);
    let options = LoggerOptions {
        replay_buffer: 1,
        ..LoggerOptions::default()
    };
    let logger = TransactionLogger::new(Box::new(backend.clone()), options);

    let (events, errors) = logger.read_events();
    assert!(events.recv_timeout(TIMEOUT).is_ok());
    drop(events);
    drop(errors);

    // The scan releases the backend once it notices, so close can proceed
    logger.close(TIMEOUT).unwrap();
    assert!(backend.is_closed());
}
