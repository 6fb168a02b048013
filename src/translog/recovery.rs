//! Startup replay
//!
//! Rebuilds store state from the transaction log before live traffic is
//! accepted.

use std::time::Duration;

use crossbeam::channel::{after, never, Receiver};
use crossbeam::select;

use crate::error::{LedgerError, Result};
use crate::store::Store;

use super::{Event, EventType, TransactionLogger};

/// Result of a replay
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    /// Number of events applied
    pub events_replayed: u64,

    pub puts: u64,

    pub deletes: u64,

    /// Sequence of the last event applied (0 for an empty log)
    pub last_sequence: u64,
}

/// Drain a replay stream pair, handing each event to `visit`
///
/// Both streams are consumed together until the event stream closes. Any
/// error (from the scan, or returned by `visit`) aborts the drain, as does
/// `timeout` elapsing. Returns the number of events visited.
pub fn drain(
    events: Receiver<Event>,
    errors: Receiver<LedgerError>,
    timeout: Duration,
    mut visit: impl FnMut(Event) -> Result<()>,
) -> Result<u64> {
    let deadline = after(timeout);
    let no_errors = never();
    let mut errors_open = true;
    let mut count = 0u64;

    loop {
        select! {
            recv(events) -> msg => match msg {
                Ok(event) => {
                    visit(event).map_err(LedgerError::into_replay_failure)?;
                    count += 1;
                }
                Err(_) => break,
            },
            recv(if errors_open { &errors } else { &no_errors }) -> msg => match msg {
                Ok(e) => return Err(e.into_replay_failure()),
                Err(_) => errors_open = false,
            },
            recv(deadline) -> _ => {
                return Err(LedgerError::Timeout(format!(
                    "replay did not finish within {:?} ({} events applied)",
                    timeout, count
                )));
            }
        }
    }

    // A scan failure is sent before the event stream closes
    if let Ok(e) = errors.try_recv() {
        return Err(e.into_replay_failure());
    }

    Ok(count)
}

/// Replay the logger's full history onto `store`
///
/// Events are applied directly to the store and never re-logged. Must run
/// before the logger's writer is started.
pub fn replay(logger: &TransactionLogger, store: &Store, timeout: Duration) -> Result<ReplayStats> {
    let (events, errors) = logger.read_events();
    let mut stats = ReplayStats::default();

    let applied = drain(events, errors, timeout, |event| {
        match event.event_type() {
            EventType::Put => {
                store.put(event.key(), event.value())?;
                stats.puts += 1;
            }
            EventType::Delete => {
                store.delete(event.key())?;
                stats.deletes += 1;
            }
        }
        stats.last_sequence = event.sequence();
        Ok(())
    })?;
    stats.events_replayed = applied;

    tracing::info!(
        events = stats.events_replayed,
        puts = stats.puts,
        deletes = stats.deletes,
        last_sequence = stats.last_sequence,
        "events replayed"
    );

    Ok(stats)
}
