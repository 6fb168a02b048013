//! Transaction log reader
//!
//! Streams the stored history out of the backend on its own thread.

use std::thread;

use crossbeam::channel::{bounded, Receiver, Sender};

use crate::error::{LedgerError, Result};

use super::{Event, SharedBackend};

/// Start a scan of the full history
///
/// Returns the event stream and the error stream. Both close when the scan
/// ends; a failure is always sent before they close. Dropping the receivers
/// aborts the scan.
pub(crate) fn spawn(
    backend: SharedBackend,
    buffer: usize,
) -> (Receiver<Event>, Receiver<LedgerError>) {
    let (event_tx, event_rx) = bounded(buffer);
    let (error_tx, error_rx) = bounded(1);
    let spawn_error_tx = error_tx.clone();

    let spawned = thread::Builder::new()
        .name("ledgerkv-replay".to_string())
        .spawn(move || scan(backend, event_tx, error_tx));

    if let Err(e) = spawned {
        let _ = spawn_error_tx.try_send(LedgerError::ReplayFailure(format!(
            "cannot start replay reader: {}",
            e
        )));
    }

    (event_rx, error_rx)
}

fn scan(backend: SharedBackend, events: Sender<Event>, errors: Sender<LedgerError>) {
    let mut last_sequence = 0u64;
    let mut count = 0u64;
    let mut consumer_gone = false;

    let result: Result<()> = backend.lock().scan(&mut |record| {
        if record.sequence < last_sequence {
            return Err(LedgerError::ReplayFailure(format!(
                "backend returned sequence {} after {}",
                record.sequence, last_sequence
            )));
        }
        last_sequence = record.sequence;

        let event = Event::from_record(record)?;
        events.send(event).map_err(|_| {
            consumer_gone = true;
            LedgerError::ReplayFailure("replay consumer went away".to_string())
        })?;
        count += 1;
        Ok(())
    });

    match result {
        Ok(()) => {
            tracing::debug!(count, last_sequence, "transaction log scan complete");
        }
        Err(_) if consumer_gone => {
            tracing::debug!(count, "transaction log scan abandoned by consumer");
        }
        Err(e) => {
            tracing::error!(error = %e, count, last_sequence, "transaction log scan failed");
            let _ = errors.send(e.into_replay_failure());
        }
    }
}
