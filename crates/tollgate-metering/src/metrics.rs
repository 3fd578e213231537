//! Prometheus metrics for a metering pipeline
//!
//! Each pipeline owns its own set; register it on whatever registry the
//! host process exposes.

use prometheus::{IntCounter, Registry};
use tollgate_common::{Result, TollgateError};

/// Counters for one pipeline
#[derive(Clone)]
pub struct PipelineMetrics {
    pub events_received: IntCounter,
    pub events_enqueued: IntCounter,
    pub events_dropped: IntCounter,
    pub events_rejected: IntCounter,
    pub events_sent: IntCounter,
    pub batches_sent: IntCounter,
    pub transport_errors: IntCounter,
}

fn counter(name: &str, help: &str) -> Result<IntCounter> {
    IntCounter::new(name, help).map_err(|e| TollgateError::Metrics(e.to_string()))
}

impl PipelineMetrics {
    pub fn new() -> Result<Self> {
        Ok(Self {
            events_received: counter(
                "tollgate_events_received_total",
                "Events submitted by producers",
            )?,
            events_enqueued: counter(
                "tollgate_events_enqueued_total",
                "Events accepted into the batch queue",
            )?,
            events_dropped: counter(
                "tollgate_events_dropped_total",
                "Events dropped because the batch queue was full",
            )?,
            events_rejected: counter(
                "tollgate_events_rejected_total",
                "Events rejected as invalid or during shutdown",
            )?,
            events_sent: counter(
                "tollgate_events_sent_total",
                "Events delivered to the transport",
            )?,
            batches_sent: counter(
                "tollgate_batches_sent_total",
                "Batches delivered to the transport",
            )?,
            transport_errors: counter(
                "tollgate_transport_errors_total",
                "Failed transport sends",
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> Result<()> {
        for c in [
            &self.events_received,
            &self.events_enqueued,
            &self.events_dropped,
            &self.events_rejected,
            &self.events_sent,
            &self.batches_sent,
            &self.transport_errors,
        ] {
            registry
                .register(Box::new(c.clone()))
                .map_err(|e| TollgateError::Metrics(e.to_string()))?;
        }
        Ok(())
    }
}
