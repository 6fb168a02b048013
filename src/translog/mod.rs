//! Transaction Log Module
//!
//! Durably records every store mutation as an ordered event and replays the
//! history at startup.
//!
//! ## Responsibilities
//! - Accept mutations without waiting on the backend (bounded queue)
//! - Append events in enqueue order through a single writer thread
//! - Surface asynchronous write failures on a side stream
//! - Stream the stored history back in sequence order for replay
//!
//! ## Pipeline
//! ```text
//!  write_put / write_delete (any thread)
//!              │
//!              ▼
//!   ┌─────────────────────┐        ┌──────────────────┐
//!   │ bounded write queue │──────▶ │  writer thread   │──▶ Backend::append
//!   └─────────────────────┘        └────────┬─────────┘
//!                                           │ failures
//!                                           ▼
//!                                        err()
//!
//!   read_events() ──▶ replay thread ──▶ Backend::scan ──▶ (events, errors)
//! ```

mod event;
mod reader;
pub mod recovery;
mod writer;

pub use event::{escape_value, unescape_value, Event, EventType};
pub use recovery::{drain, replay, ReplayStats};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::backend::Backend;
use crate::config::Config;
use crate::error::{LedgerError, Result};

use writer::{Command, Pending, WorkerParts};

/// Backend handle shared between the writer and the replay reader
pub(crate) type SharedBackend = Arc<Mutex<Box<dyn Backend>>>;

/// Tunables for a [`TransactionLogger`]
#[derive(Debug, Clone, Copy)]
pub struct LoggerOptions {
    /// Write queue capacity; producers block once it is full
    pub queue_capacity: usize,

    /// Write-failure stream capacity; reports beyond it are dropped
    pub error_capacity: usize,

    /// Events buffered between the replay scan and its consumer
    pub replay_buffer: usize,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            error_capacity: 64,
            replay_buffer: 64,
        }
    }
}

impl From<&Config> for LoggerOptions {
    fn from(config: &Config) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
            error_capacity: config.error_capacity,
            replay_buffer: config.replay_buffer,
        }
    }
}

/// Asynchronous, replayable log of store mutations
///
/// ## Lifecycle
/// 1. `new` takes ownership of an opened backend
/// 2. `read_events` streams the stored history (once, at startup)
/// 3. `run` starts the writer; queued writes begin reaching the backend
/// 4. `close` drains the queue, stops the writer and closes the backend
///
/// ## Concurrency
/// - Writes may come from any number of threads; they are serialized by the
///   queue and appended in enqueue order
/// - Writes block only while the queue is full
/// - Append failures never reach the writing caller. They are published on
///   `err()` without any link back to the write that caused them
pub struct TransactionLogger {
    queue: Sender<Command>,

    /// Write-failure stream; the sending half lives in the writer
    errors: Receiver<LedgerError>,

    /// Channel ends waiting for `run`
    parts: Mutex<Option<WorkerParts>>,

    worker: Mutex<Option<JoinHandle<()>>>,

    pending: Arc<Pending>,

    backend: SharedBackend,

    replay_buffer: usize,

    /// Set once `close` begins; writes are refused from then on
    closed: AtomicBool,

    /// Set once `close` has completed
    shut_down: Mutex<bool>,
}

impl TransactionLogger {
    /// Wrap an opened backend
    ///
    /// The writer is not started until [`run`](Self::run); writes issued
    /// before that wait in the queue.
    pub fn new(backend: Box<dyn Backend>, options: LoggerOptions) -> Self {
        let (queue_tx, queue_rx) = bounded(options.queue_capacity);
        let (errors_tx, errors_rx) = bounded(options.error_capacity);

        Self {
            queue: queue_tx,
            errors: errors_rx,
            parts: Mutex::new(Some(WorkerParts {
                queue: queue_rx,
                errors: errors_tx,
            })),
            worker: Mutex::new(None),
            pending: Arc::new(Pending::default()),
            backend: Arc::new(Mutex::new(backend)),
            replay_buffer: options.replay_buffer,
            closed: AtomicBool::new(false),
            shut_down: Mutex::new(false),
        }
    }

    /// Enqueue a Put event
    ///
    /// Returns once the event is in the queue, not once it is durable.
    pub fn write_put(&self, key: &str, value: &str) -> Result<()> {
        self.enqueue(Event::put(key, value))
    }

    /// Enqueue a Delete event
    pub fn write_delete(&self, key: &str) -> Result<()> {
        self.enqueue(Event::delete(key))
    }

    fn enqueue(&self, event: Event) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LedgerError::Closed);
        }
        if event.key().is_empty() {
            return Err(LedgerError::InvalidKey("key must not be empty".to_string()));
        }

        self.pending.add();
        if self.queue.send(Command::Append(event)).is_err() {
            self.pending.done();
            return Err(LedgerError::Closed);
        }

        Ok(())
    }

    /// Stream of asynchronous write failures
    ///
    /// A failure carries no reference to the write that caused it. The
    /// stream disconnects after `close` stops the writer.
    pub fn err(&self) -> Receiver<LedgerError> {
        self.errors.clone()
    }

    /// Stream the stored history in ascending sequence order
    ///
    /// Both receivers must be drained (see [`recovery::drain`]): the event
    /// stream closes when the scan ends, and a failure is sent on the error
    /// stream before that happens.
    pub fn read_events(&self) -> (Receiver<Event>, Receiver<LedgerError>) {
        reader::spawn(Arc::clone(&self.backend), self.replay_buffer)
    }

    /// Start the writer thread
    ///
    /// Calling `run` again is a no-op.
    pub fn run(&self) -> Result<()> {
        let parts = match self.parts.lock().take() {
            Some(parts) => parts,
            None => {
                tracing::warn!("transaction log writer already started");
                return Ok(());
            }
        };

        let handle = writer::spawn(parts, Arc::clone(&self.backend), Arc::clone(&self.pending))?;
        *self.worker.lock() = Some(handle);

        Ok(())
    }

    /// Block until every event enqueued so far has been handed to the backend
    ///
    /// Never returns if events are queued and the writer was never started.
    pub fn wait(&self) {
        self.pending.wait();
    }

    /// [`wait`](Self::wait) bounded by `timeout`; returns `true` if drained
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.pending.wait_timeout(timeout)
    }

    /// Number of enqueued events not yet handed to the backend
    pub fn pending(&self) -> usize {
        self.pending.count()
    }

    /// Drain the queue, stop the writer and close the backend
    ///
    /// Writes are refused from the moment `close` is called. If the writer
    /// was never started but events are queued, it is started so they are
    /// drained rather than discarded. When the queue does not drain within
    /// `timeout`, `Timeout` is returned and the writer is left running;
    /// `close` may be called again. Once a close has completed, further calls
    /// return `Ok(())`.
    pub fn close(&self, timeout: Duration) -> Result<()> {
        self.closed.store(true, Ordering::Release);

        let mut shut_down = self.shut_down.lock();
        if *shut_down {
            return Ok(());
        }

        if self.pending.count() > 0 && self.parts.lock().is_some() {
            self.run()?;
        }

        if !self.pending.wait_timeout(timeout) {
            return Err(LedgerError::Timeout(format!(
                "{} events still pending after {:?}",
                self.pending.count(),
                timeout
            )));
        }

        if let Some(handle) = self.worker.lock().take() {
            // The queue is empty, so this does not block
            let _ = self.queue.send(Command::Stop);
            handle
                .join()
                .map_err(|_| LedgerError::Backend("writer thread panicked".to_string()))?;
        }

        // Never started: release the unused channel ends
        self.parts.lock().take();

        self.backend.lock().close()?;
        *shut_down = true;

        tracing::info!("transaction logger closed");
        Ok(())
    }
}
