//! Byte meters
//!
//! This module provides:
//! - [`BytesMeter`]: thread-safe read/written byte counters with delta snapshots
//! - [`NoopMeter`]: the same contract with no accounting, for disabled metering
//! - Named integer counters attached to a meter

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use tollgate_common::{metric, MeterError, Result, UsageEvent};
use tracing::trace;

/// Byte and counter accounting for a unit of work
pub trait Meter: Send + Sync + fmt::Debug {
    /// Record bytes written; negative counts are rejected
    fn add_bytes_written(&self, n: i64) -> Result<()>;

    /// Record bytes read; negative counts are rejected
    fn add_bytes_read(&self, n: i64) -> Result<()>;

    /// Cumulative bytes written
    fn bytes_written(&self) -> u64;

    /// Cumulative bytes read
    fn bytes_read(&self) -> u64;

    /// Bytes written since the previous delta read
    fn bytes_written_delta(&self) -> u64;

    /// Bytes read since the previous delta read
    fn bytes_read_delta(&self) -> u64;

    /// Register a named counter at zero; no-op if it exists
    fn add_counter(&self, name: &str);

    fn count_inc(&self, name: &str, n: i64);

    fn count_dec(&self, name: &str, n: i64);

    /// Current value of a named counter, zero if unknown
    fn count(&self, name: &str) -> i64;

    /// Reset a known counter to zero
    fn reset_count(&self, name: &str);

    fn is_noop(&self) -> bool {
        false
    }

    /// Take both byte deltas and add them to `event` as
    /// `written_bytes`/`read_bytes`.
    fn fold_into(&self, mut event: UsageEvent) -> UsageEvent {
        let written = self.bytes_written_delta();
        let read = self.bytes_read_delta();
        if written > 0 {
            event.add_metric(metric::WRITTEN_BYTES, written as f64);
        }
        if read > 0 {
            event.add_metric(metric::READ_BYTES, read as f64);
        }
        event
    }
}

#[derive(Debug, Default)]
struct ByteCounters {
    written: u64,
    read: u64,
    written_delta: u64,
    read_delta: u64,
    counters: HashMap<String, i64>,
}

/// Thread-safe byte meter
#[derive(Debug, Default)]
pub struct BytesMeter {
    inner: RwLock<ByteCounters>,
}

impl BytesMeter {
    pub fn new() -> Self {
        Self::default()
    }

    fn checked(kind: &'static str, n: i64) -> Result<u64> {
        u64::try_from(n).map_err(|_| MeterError::NegativeByteCount { kind, value: n }.into())
    }
}

impl fmt::Display for BytesMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        write!(
            f,
            "bytes written: {}, bytes read: {}",
            inner.written, inner.read
        )
    }
}

impl Meter for BytesMeter {
    fn add_bytes_written(&self, n: i64) -> Result<()> {
        let n = Self::checked("written", n)?;
        let mut inner = self.inner.write();
        inner.written_delta = inner.written_delta.wrapping_add(n);
        inner.written = inner.written.wrapping_add(n);
        trace!(mode = "write", bytes = n, "bytes metering");
        Ok(())
    }

    fn add_bytes_read(&self, n: i64) -> Result<()> {
        let n = Self::checked("read", n)?;
        let mut inner = self.inner.write();
        inner.read_delta = inner.read_delta.wrapping_add(n);
        inner.read = inner.read.wrapping_add(n);
        trace!(mode = "read", bytes = n, "bytes metering");
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.inner.read().written
    }

    fn bytes_read(&self) -> u64 {
        self.inner.read().read
    }

    fn bytes_written_delta(&self) -> u64 {
        std::mem::take(&mut self.inner.write().written_delta)
    }

    fn bytes_read_delta(&self) -> u64 {
        std::mem::take(&mut self.inner.write().read_delta)
    }

    fn add_counter(&self, name: &str) {
        self.inner
            .write()
            .counters
            .entry(name.to_string())
            .or_insert(0);
    }

    fn count_inc(&self, name: &str, n: i64) {
        let mut inner = self.inner.write();
        let value = inner.counters.entry(name.to_string()).or_insert(0);
        *value = value.wrapping_add(n);
    }

    fn count_dec(&self, name: &str, n: i64) {
        let mut inner = self.inner.write();
        let value = inner.counters.entry(name.to_string()).or_insert(0);
        *value = value.wrapping_sub(n);
    }

    fn count(&self, name: &str) -> i64 {
        self.inner.read().counters.get(name).copied().unwrap_or(0)
    }

    fn reset_count(&self, name: &str) {
        if let Some(value) = self.inner.write().counters.get_mut(name) {
            *value = 0;
        }
    }
}

/// Meter that records nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMeter;

/// Shared no-op instance handed out when no meter is attached
pub static NOOP_METER: NoopMeter = NoopMeter;

impl Meter for NoopMeter {
    fn add_bytes_written(&self, _n: i64) -> Result<()> {
        Ok(())
    }

    fn add_bytes_read(&self, _n: i64) -> Result<()> {
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        0
    }

    fn bytes_read(&self) -> u64 {
        0
    }

    fn bytes_written_delta(&self) -> u64 {
        0
    }

    fn bytes_read_delta(&self) -> u64 {
        0
    }

    fn add_counter(&self, _name: &str) {}

    fn count_inc(&self, _name: &str, _n: i64) {}

    fn count_dec(&self, _name: &str, _n: i64) {}

    fn count(&self, _name: &str) -> i64 {
        0
    }

    fn reset_count(&self, _name: &str) {}

    fn is_noop(&self) -> bool {
        true
    }
}
