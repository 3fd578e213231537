//! Metering pipeline facade
//!
//! [`Metering`] is what request-serving code holds. It resolves each event's
//! network from the pipeline configuration or the [`RequestScope`], then hands
//! the event to the accumulator (when enabled) or straight to the
//! [`BatchEmitter`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tollgate_common::{Result, UsageEvent, MULTI_NETWORK};
use tracing::{error, info, warn};

use crate::accumulator::{Accumulator, EventSink};
use crate::config::MeteringConfig;
use crate::emitter::{BatchEmitter, EmitterState};
use crate::metrics::PipelineMetrics;
use crate::registry::TransportRegistry;
use crate::scope::RequestScope;
use crate::transport::Transport;

/// Cumulative pipeline status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounters {
    /// Events submitted through [`Metering::emit`]
    pub total: u64,
    /// Failed transport sends
    pub errors: u64,
}

struct AccumulatorTask {
    accumulator: Arc<Accumulator>,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// A configured metering pipeline
pub struct Metering {
    config: MeteringConfig,
    emitter: Arc<BatchEmitter>,
    accumulator: Option<AccumulatorTask>,
    metrics: Arc<PipelineMetrics>,
}

impl Metering {
    /// Build a pipeline around `transport`. Must be called inside a tokio
    /// runtime: the emitter worker and accumulator flusher are spawned here.
    pub fn new(config: MeteringConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(PipelineMetrics::new()?);
        let emitter = Arc::new(BatchEmitter::with_metrics(
            config.emitter.clone(),
            transport,
            metrics.clone(),
        )?);

        let accumulator = if config.accumulator.enabled {
            let sink: Arc<dyn EventSink> = emitter.clone();
            let accumulator = Arc::new(Accumulator::new(
                sink,
                Duration::from_millis(config.accumulator.flush_interval_ms),
            ));
            let shutdown = CancellationToken::new();
            let handle = accumulator.start(shutdown.clone());
            Some(AccumulatorTask {
                accumulator,
                shutdown,
                handle: Mutex::new(Some(handle)),
            })
        } else {
            None
        };

        info!(
            dsn = %config.dsn,
            network = config.network.as_deref().unwrap_or(""),
            accumulate = config.accumulator.enabled,
            "metering pipeline started"
        );

        Ok(Self {
            config,
            emitter,
            accumulator,
            metrics,
        })
    }

    /// Build the transport named by `config.dsn` from `registry`, then the
    /// pipeline. Configuration errors surface here, before anything runs.
    pub fn from_config(config: MeteringConfig, registry: &TransportRegistry) -> Result<Self> {
        let transport = registry.build(&config)?;
        Self::new(config, transport)
    }

    pub fn config(&self) -> &MeteringConfig {
        &self.config
    }

    /// Submit an event. Never blocks on I/O and never fails; problems show
    /// up in logs and counters.
    ///
    /// # Panics
    ///
    /// With `panic_on_drop` set: when the queue is full, or, with accumulation
    /// enabled, once a flush has had events refused by the full queue.
    pub fn emit(&self, scope: &RequestScope, mut event: UsageEvent) {
        self.metrics.events_received.inc();

        match self.resolve_network(scope, &event) {
            Some(network) => event.network = network,
            None => {
                warn!(
                    service = %event.service,
                    method = %event.method,
                    "network not set on request scope, dropping event"
                );
                self.metrics.events_rejected.inc();
                return;
            }
        }

        match &self.accumulator {
            Some(task) if self.emitter.state() == EmitterState::Running => {
                if let Err(e) = event.validate() {
                    warn!(service = %event.service, error = %e, "dropping invalid event");
                    self.metrics.events_rejected.inc();
                    return;
                }
                if self.config.emitter.panic_on_drop && task.accumulator.refused() > 0 {
                    panic!(
                        "failed to queue metering events: {} accumulated events dropped, queue of {} is full",
                        task.accumulator.refused(),
                        self.config.emitter.buffer_size
                    );
                }
                if let Err(event) = task.accumulator.merge(event) {
                    warn!(service = %event.service, "accumulator is closed, cannot track event");
                    self.metrics.events_rejected.inc();
                }
            }
            _ => self.emitter.emit(event),
        }
    }

    fn resolve_network(&self, scope: &RequestScope, event: &UsageEvent) -> Option<String> {
        match self.config.network.as_deref() {
            Some(fixed) if !fixed.is_empty() && fixed != MULTI_NETWORK => Some(fixed.to_string()),
            _ => scope
                .network()
                .or_else(|| Some(event.network.as_str()).filter(|n| !n.is_empty()))
                .map(str::to_string),
        }
    }

    pub fn status(&self) -> StatusCounters {
        StatusCounters {
            total: self.metrics.events_received.get(),
            errors: self.metrics.transport_errors.get(),
        }
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.metrics.clone()
    }

    pub fn emitter(&self) -> &BatchEmitter {
        &self.emitter
    }

    /// Events waiting in the accumulator window
    pub fn pending_accumulated(&self) -> usize {
        self.accumulator
            .as_ref()
            .map_or(0, |task| task.accumulator.pending())
    }

    /// Flush the accumulator, then drain the emitter and close the
    /// transport. Safe to call more than once.
    pub async fn shutdown(&self) {
        if let Some(task) = &self.accumulator {
            task.shutdown.cancel();
            let handle = task.handle.lock().take();
            if let Some(handle) = handle {
                if let Err(e) = handle.await {
                    error!("accumulator flusher failed: {}", e);
                }
            }
            // no-op after a clean exit of the flusher
            let count = task.accumulator.close();
            if count > 0 {
                warn!(count, "flushed accumulator left open by its flusher");
            }
        }
        self.emitter.shutdown().await;
        info!(status = ?self.status(), "metering pipeline stopped");
    }
}

impl Drop for Metering {
    fn drop(&mut self) {
        if let Some(task) = &self.accumulator {
            task.shutdown.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{EventBatch, NullTransport};
    use async_trait::async_trait;
    use tollgate_common::{metric, TollgateError};

    #[derive(Default)]
    struct CollectingTransport {
        events: Mutex<Vec<UsageEvent>>,
    }

    #[async_trait]
    impl Transport for CollectingTransport {
        fn name(&self) -> &'static str {
            "collecting"
        }

        async fn send(&self, batch: &EventBatch) -> Result<()> {
            self.events.lock().extend(batch.events.iter().cloned());
            Ok(())
        }
    }

    struct RefusingTransport;

    #[async_trait]
    impl Transport for RefusingTransport {
        fn name(&self) -> &'static str {
            "refusing"
        }

        async fn send(&self, _batch: &EventBatch) -> Result<()> {
            Err(TollgateError::Transport("refused".into()))
        }
    }

    fn config(network: Option<&str>) -> MeteringConfig {
        MeteringConfig {
            dsn: "null://".into(),
            network: network.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fixed_network_stamped() {
        let transport = Arc::new(CollectingTransport::default());
        let metering = Metering::new(config(Some("eth-mainnet")), transport.clone()).unwrap();

        let scope = RequestScope::new().with_network("sol-mainnet");
        metering.emit(&scope, UsageEvent::new("svc", "m"));
        metering.shutdown().await;

        let events = transport.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].network, "eth-mainnet");
    }

    #[tokio::test]
    async fn test_multi_network_reads_scope() {
        let transport = Arc::new(CollectingTransport::default());
        let metering = Metering::new(config(Some(MULTI_NETWORK)), transport.clone()).unwrap();

        metering.emit(
            &RequestScope::new().with_network("sol-mainnet"),
            UsageEvent::new("svc", "m"),
        );
        metering.emit(&RequestScope::new(), UsageEvent::new("svc", "m"));
        metering.emit(
            &RequestScope::new(),
            UsageEvent::new("svc", "m").with_network("btc-mainnet"),
        );
        metering.shutdown().await;

        let networks: Vec<_> = transport
            .events
            .lock()
            .iter()
            .map(|e| e.network.clone())
            .collect();
        assert_eq!(networks, vec!["sol-mainnet", "btc-mainnet"]);
        assert_eq!(metering.metrics().events_rejected.get(), 1);
        assert_eq!(metering.status().total, 3);
    }

    #[tokio::test]
    async fn test_accumulated_events_flush_on_shutdown() {
        let transport = Arc::new(CollectingTransport::default());
        let mut cfg = config(Some("eth-mainnet"));
        cfg.accumulator.enabled = true;
        cfg.accumulator.flush_interval_ms = 60_000;
        let metering = Metering::new(cfg, transport.clone()).unwrap();

        let scope = RequestScope::new();
        for _ in 0..10 {
            metering.emit(
                &scope,
                UsageEvent::new("svc", "m")
                    .with_user("user.id.1")
                    .with_metric(metric::REQUESTS_COUNT, 1.0),
            );
        }
        assert_eq!(metering.pending_accumulated(), 1);
        metering.shutdown().await;

        let events = transport.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metric(metric::REQUESTS_COUNT), Some(10.0));
    }

    #[tokio::test]
    async fn test_status_counts_transport_errors() {
        let metering = Metering::new(config(Some("eth-mainnet")), Arc::new(RefusingTransport)).unwrap();
        metering.emit(&RequestScope::new(), UsageEvent::new("svc", "m"));
        metering.shutdown().await;

        assert_eq!(
            metering.status(),
            StatusCounters {
                total: 1,
                errors: 1
            }
        );
    }

    #[tokio::test]
    async fn test_emit_after_shutdown_rejected() {
        let transport = Arc::new(NullTransport::new());
        let metering = Metering::new(config(Some("eth-mainnet")), transport.clone()).unwrap();
        metering.shutdown().await;
        metering.shutdown().await;

        metering.emit(&RequestScope::new(), UsageEvent::new("svc", "m"));
        assert_eq!(transport.events_seen(), 0);
        assert_eq!(metering.metrics().events_rejected.get(), 1);
    }

    #[tokio::test]
    async fn test_from_config_surfaces_config_errors() {
        let registry = TransportRegistry::with_defaults();
        let cfg = MeteringConfig::from_dsn("grpc://localhost:9010").unwrap();
        assert!(matches!(
            Metering::from_config(cfg, &registry),
            Err(TollgateError::Config(_))
        ));

        let cfg = MeteringConfig::from_dsn("null://?network=eth-mainnet").unwrap();
        let metering = Metering::from_config(cfg, &registry).unwrap();
        metering.shutdown().await;
    }
}
