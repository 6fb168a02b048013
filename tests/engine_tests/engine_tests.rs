//! Integration tests for the engine
//!
//! These tests verify:
//! - Basic operations (put, get, delete)
//! - Concurrent writers to one key leave a log that replays to the live state
//! - Invalid configuration is rejected at startup
//! - State rebuilt from the log after a restart (file and SQLite)
//! - Fail-fast startup when the backend is unreachable or the log is bad
//! - Mutations that outlive a failed append

use std::sync::Arc;
use std::thread;

use ledgerkv::backend::{LogRecord, MemoryBackend};
use ledgerkv::config::SyncStrategy;
use ledgerkv::translog::EventType;
use ledgerkv::{Config, Engine, LedgerError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn file_config(temp: &TempDir) -> Config {
    Config::builder()
        .log_file(temp.path().join("transactions.log"), SyncStrategy::EveryWrite)
        .shutdown_timeout_ms(10_000)
        .build()
}

fn sqlite_config(temp: &TempDir) -> Config {
    Config::builder()
        .sqlite(temp.path().join("transactions.db"))
        .build()
}

fn memory_engine(backend: &MemoryBackend) -> Engine {
    Engine::with_backend(Config::default(), Box::new(backend.clone())).unwrap()
}

// =============================================================================
// Basic Operation Tests
// =============================================================================

#[test]
fn test_put_get_delete() {
    let backend = MemoryBackend::new();
    let engine = memory_engine(&backend);

    engine.put("a", "1").unwrap();
    assert_eq!(engine.get("a").unwrap(), "1");

    engine.put("a", "2").unwrap();
    assert_eq!(engine.get("a").unwrap(), "2");

    engine.delete("a").unwrap();
    assert!(matches!(engine.get("a"), Err(LedgerError::KeyNotFound)));

    engine.sync();
    let records = backend.records();
    assert_eq!(records.len(), 3);
    assert_eq!(records[2].event_type, EventType::Delete);

    engine.close().unwrap();
}

#[test]
fn test_delete_missing_key_is_logged() {
    let backend = MemoryBackend::new();
    let engine = memory_engine(&backend);

    engine.delete("never-set").unwrap();
    engine.sync();

    assert_eq!(backend.len(), 1);
    engine.close().unwrap();
}

#[test]
fn test_empty_key_rejected_and_not_logged() {
    let backend = MemoryBackend::new();
    let engine = memory_engine(&backend);

    assert!(matches!(engine.put("", "v"), Err(LedgerError::InvalidKey(_))));
    assert!(matches!(engine.delete(""), Err(LedgerError::InvalidKey(_))));

    engine.close().unwrap();
    assert!(backend.is_empty());
}

#[test]
fn test_concurrent_clients() {
    let backend = MemoryBackend::new();
    let engine = Arc::new(memory_engine(&backend));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..100 {
                    engine.put(&format!("t{}-{}", t, i), "v").unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    engine.close().unwrap();

    assert_eq!(engine.store().len(), 400);
    assert_eq!(backend.len(), 400);
}

#[test]
fn test_contended_key_replays_to_live_state() {
    const ROUNDS: usize = 20;
    const WRITERS: usize = 8;
    const WRITES: usize = 50;

    for round in 0..ROUNDS {
        let backend = MemoryBackend::new();
        let engine = Arc::new(memory_engine(&backend));

        let handles: Vec<_> = (0..WRITERS)
            .map(|t| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for i in 0..WRITES {
                        if i % 7 == 3 {
                            engine.delete("shared").unwrap();
                        } else {
                            engine.put("shared", &format!("{}-{}", t, i)).unwrap();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let live = engine.store().snapshot();
        engine.close().unwrap();

        let restarted = memory_engine(&backend);
        assert_eq!(
            restarted.store().snapshot(),
            live,
            "replayed state diverged in round {}",
            round
        );
        restarted.close().unwrap();
    }
}

// =============================================================================
// Restart Tests
// =============================================================================

#[test]
fn test_restart_with_file_log() {
    let temp = TempDir::new().unwrap();

    {
        let engine = Engine::open(file_config(&temp)).unwrap();
        engine.put("a", "1").unwrap();
        engine.put("b", "x").unwrap();
        engine.delete("a").unwrap();
        engine.close().unwrap();
    }

    let engine = Engine::open(file_config(&temp)).unwrap();

    assert_eq!(engine.get("b").unwrap(), "x");
    assert!(matches!(engine.get("a"), Err(LedgerError::KeyNotFound)));

    let stats = engine.replay_stats();
    assert_eq!(stats.events_replayed, 3);
    assert_eq!(stats.puts, 2);
    assert_eq!(stats.deletes, 1);
    assert_eq!(stats.last_sequence, 3);

    engine.close().unwrap();
}

#[test]
fn test_restart_continues_log() {
    let temp = TempDir::new().unwrap();

    {
        let engine = Engine::open(file_config(&temp)).unwrap();
        engine.put("a", "1").unwrap();
        engine.close().unwrap();
    }
    {
        let engine = Engine::open(file_config(&temp)).unwrap();
        engine.put("a", "2").unwrap();
        engine.close().unwrap();
    }

    let engine = Engine::open(file_config(&temp)).unwrap();
    assert_eq!(engine.get("a").unwrap(), "2");
    assert_eq!(engine.replay_stats().last_sequence, 2);
    engine.close().unwrap();
}

#[test]
fn test_restart_with_sqlite_log() {
    let temp = TempDir::new().unwrap();

    {
        let engine = Engine::open(sqlite_config(&temp)).unwrap();
        engine.put("greeting", "hello, world").unwrap();
        engine.put("b", "x").unwrap();
        engine.close().unwrap();
    }

    let engine = Engine::open(sqlite_config(&temp)).unwrap();

    assert_eq!(engine.get("greeting").unwrap(), "hello, world");
    assert_eq!(engine.get("b").unwrap(), "x");
    assert_eq!(engine.replay_stats().events_replayed, 2);

    engine.close().unwrap();
}

// =============================================================================
// Startup Failure Tests
// =============================================================================

#[test]
fn test_unreachable_backend_fails_startup() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .sqlite(temp.path().join("no").join("such").join("dir.db"))
        .build();

    let result = Engine::open(config);

    assert!(matches!(result, Err(LedgerError::BackendUnavailable(_))));
}

#[test]
fn test_invalid_config_fails_startup() {
    let config = Config::builder().queue_capacity(0).build();

    let result = Engine::with_backend(config, Box::new(MemoryBackend::new()));

    assert!(matches!(result, Err(LedgerError::Config(_))));
}

#[test]
fn test_invalid_config_checked_before_opening_backend() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("transactions.log");
    let config = Config::builder()
        .log_file(&path, SyncStrategy::EveryNEntries { count: 0 })
        .build();

    let result = Engine::open(config);

    assert!(matches!(result, Err(LedgerError::Config(_))));
    assert!(!path.exists());
}

#[test]
fn test_bad_history_fails_startup() {
    let backend = MemoryBackend::with_records(vec![
        LogRecord {
            sequence: 2,
            event_type: EventType::Put,
            key: "a".to_string(),
            value: "1".to_string(),
        },
        LogRecord {
            sequence: 1,
            event_type: EventType::Put,
            key: "b".to_string(),
            value: "2".to_string(),
        },
    ]);

    let result = Engine::with_backend(Config::default(), Box::new(backend));

    assert!(matches!(result, Err(LedgerError::ReplayFailure(_))));
}

// =============================================================================
// Write Failure Tests
// =============================================================================

#[test]
fn test_failed_append_keeps_mutation() {
    let backend = MemoryBackend::new();
    let engine = memory_engine(&backend);

    backend.set_fail_appends(true);
    engine.put("a", "1").unwrap();
    engine.sync();

    // Applied to the store, missing from the log
    assert_eq!(engine.get("a").unwrap(), "1");
    assert!(backend.is_empty());

    backend.set_fail_appends(false);
    engine.put("b", "2").unwrap();
    engine.close().unwrap();

    assert_eq!(backend.len(), 1);
}

#[test]
fn test_mutation_after_close_is_rejected_by_logger() {
    let backend = MemoryBackend::new();
    let engine = memory_engine(&backend);
    engine.close().unwrap();

    assert!(matches!(engine.put("a", "1"), Err(LedgerError::Closed)));
    assert!(backend.is_empty());
}
