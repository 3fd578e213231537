//! Usage accumulation by group key
//!
//! Folds events that share a [`GroupKey`] within a flush window, so one
//! merged event per key reaches the next stage instead of one per request.
//! The whole map is swapped out at flush time, so every merge lands in
//! exactly one flush. Once [`Accumulator::close`] has run, merges are
//! refused and the event is handed back to the caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tollgate_common::{GroupKey, Result, TollgateError, UsageEvent};
use tracing::{debug, info, trace, warn};

/// Default flush window
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Consumer of flushed events
pub trait EventSink: Send + Sync {
    /// Take ownership of one flushed event. Must not panic; a refused event
    /// is reported through the error.
    fn accept(&self, event: UsageEvent) -> Result<()>;
}

impl EventSink for mpsc::UnboundedSender<UsageEvent> {
    fn accept(&self, event: UsageEvent) -> Result<()> {
        self.send(event).map_err(|e| {
            debug!(service = %e.0.service, "event receiver dropped, discarding flushed event");
            TollgateError::Closed("event receiver dropped")
        })
    }
}

#[derive(Default)]
struct Window {
    events: HashMap<GroupKey, UsageEvent>,
    closed: bool,
}

/// Merges same-key events and flushes them on a schedule
pub struct Accumulator {
    window: Mutex<Window>,
    sink: Arc<dyn EventSink>,
    flush_interval: Duration,
    refused: AtomicU64,
}

impl Accumulator {
    pub fn new(sink: Arc<dyn EventSink>, flush_interval: Duration) -> Self {
        Self {
            window: Mutex::new(Window::default()),
            sink,
            flush_interval,
            refused: AtomicU64::new(0),
        }
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Fold an event into the current window.
    ///
    /// Returns the event unchanged when the accumulator is closed.
    pub fn merge(&self, mut event: UsageEvent) -> std::result::Result<(), UsageEvent> {
        trace!(user_id = %event.user_id, service = %event.service, "accumulating event");
        let key = event.group_key();
        let now = Utc::now();

        let mut window = self.window.lock();
        if window.closed {
            return Err(event);
        }
        match window.events.get_mut(&key) {
            Some(existing) => existing.merge(&event, now),
            None => {
                event.timestamp.get_or_insert(now);
                window.events.insert(key, event);
            }
        }
        Ok(())
    }

    /// Number of keys in the current window
    pub fn pending(&self) -> usize {
        self.window.lock().events.len()
    }

    pub fn is_closed(&self) -> bool {
        self.window.lock().closed
    }

    /// Flushed events the sink refused so far
    pub fn refused(&self) -> u64 {
        self.refused.load(Ordering::Relaxed)
    }

    /// Detach the current window and hand every entry to the sink.
    ///
    /// Returns the number of events flushed.
    pub fn flush(&self) -> usize {
        let detached = std::mem::take(&mut self.window.lock().events);
        self.deliver(detached)
    }

    /// Final flush: detach the window and refuse every later merge, in one
    /// step under the lock. Idempotent.
    pub fn close(&self) -> usize {
        let detached = {
            let mut window = self.window.lock();
            window.closed = true;
            std::mem::take(&mut window.events)
        };
        self.deliver(detached)
    }

    fn deliver(&self, detached: HashMap<GroupKey, UsageEvent>) -> usize {
        let count = detached.len();
        if count == 0 {
            return 0;
        }

        debug!(count, "flushing accumulated events");
        let mut refused = 0u64;
        for (_, event) in detached {
            if self.sink.accept(event).is_err() {
                refused += 1;
            }
        }
        if refused > 0 {
            self.refused.fetch_add(refused, Ordering::Relaxed);
            warn!(count, refused, "next stage refused accumulated events");
        }
        count
    }

    /// Start the periodic flusher. When `shutdown` fires the accumulator is
    /// closed with a final flush.
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let accumulator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        let count = accumulator.close();
                        info!(count, "accumulator flushed on shutdown");
                        break;
                    }
                    _ = tokio::time::sleep(accumulator.flush_interval) => {
                        accumulator.flush();
                    }
                }
            }
        })
    }
}
