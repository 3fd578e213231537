//! Transports
//!
//! A [`Transport`] delivers a batch of events to a collector. The batch
//! emitter calls it from its single worker only, so implementations need no
//! internal coordination between concurrent sends.

pub mod grpc;
pub mod logger;
pub mod null;

use async_trait::async_trait;
use tollgate_common::{Result, UsageEvent};
use uuid::Uuid;

pub use grpc::{GrpcTransport, GrpcTransportConfig};
pub use logger::LoggerTransport;
pub use null::NullTransport;

/// Batch of usage events handed to a transport
#[derive(Debug, Clone)]
pub struct EventBatch {
    /// Batch ID
    pub batch_id: Uuid,
    /// Events in enqueue order
    pub events: Vec<UsageEvent>,
    /// Batch created timestamp (Unix millis)
    pub created_at: i64,
}

impl EventBatch {
    pub fn new(events: Vec<UsageEvent>) -> Self {
        Self {
            batch_id: Uuid::now_v7(),
            events,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if batch is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Delivery of event batches to a remote collector
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Deliver one batch. Errors are logged and counted by the caller; the
    /// batch is not retried.
    async fn send(&self, batch: &EventBatch) -> Result<()>;

    /// Release resources once the final batch has been sent
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
