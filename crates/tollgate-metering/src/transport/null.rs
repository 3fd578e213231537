//! Transport that discards every batch

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tollgate_common::Result;

use super::{EventBatch, Transport};

/// Discards events, keeping only a count
#[derive(Debug, Default)]
pub struct NullTransport {
    events_seen: AtomicU64,
}

impl NullTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far
    pub fn events_seen(&self) -> u64 {
        self.events_seen.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for NullTransport {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn send(&self, batch: &EventBatch) -> Result<()> {
        self.events_seen
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}
