//! Transaction log writer
//!
//! The single background lane that moves queued events into the backend.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};

use crate::error::{LedgerError, Result};

use super::event::escape_value;
use super::{Event, EventType, SharedBackend};

/// Message on the write queue
pub(crate) enum Command {
    Append(Event),
    Stop,
}

/// Channel ends handed to the writer thread when it starts
pub(crate) struct WorkerParts {
    pub(crate) queue: Receiver<Command>,
    pub(crate) errors: Sender<LedgerError>,
}

/// Count of enqueued events whose append has not been attempted yet
#[derive(Default)]
pub(crate) struct Pending {
    count: Mutex<usize>,
    drained: Condvar,
}

impl Pending {
    pub(crate) fn add(&self) {
        *self.count.lock() += 1;
    }

    pub(crate) fn done(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    pub(crate) fn count(&self) -> usize {
        *self.count.lock()
    }

    /// Block until the count reaches zero
    pub(crate) fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.drained.wait(&mut count);
        }
    }

    /// Block until the count reaches zero or `timeout` elapses
    ///
    /// Returns `true` if drained.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut count = self.count.lock();
        while *count > 0 {
            match deadline {
                Some(deadline) => {
                    if self.drained.wait_until(&mut count, deadline).timed_out() {
                        return *count == 0;
                    }
                }
                None => self.drained.wait(&mut count),
            }
        }
        true
    }
}

/// Start the writer thread
pub(crate) fn spawn(
    parts: WorkerParts,
    backend: SharedBackend,
    pending: Arc<Pending>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("ledgerkv-writer".to_string())
        .spawn(move || run(parts, backend, pending))?;
    Ok(handle)
}

fn run(parts: WorkerParts, backend: SharedBackend, pending: Arc<Pending>) {
    let WorkerParts { queue, errors } = parts;
    let mut written = 0u64;
    let mut failed = 0u64;

    tracing::info!("transaction log writer started");

    for command in queue.iter() {
        let event = match command {
            Command::Append(event) => event,
            Command::Stop => break,
        };

        let value = match event.event_type() {
            EventType::Put => escape_value(event.value()),
            EventType::Delete => String::new(),
        };

        let result = backend
            .lock()
            .append(event.event_type(), event.key(), &value);

        match result {
            Ok(sequence) => {
                written += 1;
                tracing::debug!(
                    sequence,
                    event_type = %event.event_type(),
                    key = event.key(),
                    "event appended"
                );
            }
            Err(e) => {
                failed += 1;
                report_failure(&errors, e);
            }
        }

        // Failure (if any) is published before the event stops counting as
        // pending, so it is visible to anyone returning from `wait`
        pending.done();
    }

    tracing::info!(written, failed, "transaction log writer stopped");
}

/// Publish a failed append without ever blocking the writer
fn report_failure(errors: &Sender<LedgerError>, e: LedgerError) {
    tracing::warn!(error = %e, "transaction log append failed; store and log have diverged");

    match errors.try_send(LedgerError::WriteFailure(e.to_string())) {
        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
        Err(TrySendError::Full(dropped)) => {
            tracing::error!(error = %dropped, "write-failure stream is full; report dropped");
        }
    }
}
