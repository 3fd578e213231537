//! Buffered batch emitter
//!
//! Decouples producers from transport latency:
//! - producers call [`BatchEmitter::emit`], which never waits on I/O
//! - a bounded queue caps memory; overflow is dropped and counted, or panics
//!   when `panic_on_drop` is set
//! - a single worker forms batches by size and by time and hands them to the
//!   [`Transport`]
//! - [`BatchEmitter::shutdown`] drains everything enqueued before it was called

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tollgate_common::{Result, TollgateError, UsageEvent};
use tracing::{debug, error, info, warn};

use crate::accumulator::EventSink;
use crate::metrics::PipelineMetrics;
use crate::transport::{EventBatch, Transport};

/// Configuration for the batch emitter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitterConfig {
    /// Queue capacity
    pub buffer_size: usize,
    /// Maximum events per batch
    pub max_batch_size: usize,
    /// Flush interval in milliseconds
    pub flush_interval_ms: u64,
    /// Panic instead of dropping when the queue is full
    pub panic_on_drop: bool,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            buffer_size: 10000,
            max_batch_size: 1000,
            flush_interval_ms: 100,
            panic_on_drop: false,
        }
    }
}

impl EmitterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(TollgateError::Config("buffer size must be positive".into()));
        }
        if self.max_batch_size == 0 {
            return Err(TollgateError::Config("batch size must be positive".into()));
        }
        if self.flush_interval_ms == 0 {
            return Err(TollgateError::Config("flush interval must be positive".into()));
        }
        Ok(())
    }
}

/// Emitter lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EmitterState {
    Running = 0,
    Terminating = 1,
    Stopped = 2,
}

impl From<u8> for EmitterState {
    fn from(value: u8) -> Self {
        match value {
            0 => EmitterState::Running,
            1 => EmitterState::Terminating,
            _ => EmitterState::Stopped,
        }
    }
}

/// Snapshot of emitter counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitterStats {
    pub enqueued: u64,
    pub dropped: u64,
    pub rejected: u64,
    pub sent: u64,
    pub batches: u64,
    pub errors: u64,
}

/// Batching event emitter with a single background worker
pub struct BatchEmitter {
    config: EmitterConfig,
    event_tx: mpsc::Sender<UsageEvent>,
    state: AtomicU8,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<PipelineMetrics>,
}

impl BatchEmitter {
    /// Create an emitter and spawn its worker on the current tokio runtime
    pub fn new(config: EmitterConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let metrics = Arc::new(PipelineMetrics::new()?);
        Self::with_metrics(config, transport, metrics)
    }

    /// Create an emitter reporting into shared metrics
    pub fn with_metrics(
        config: EmitterConfig,
        transport: Arc<dyn Transport>,
        metrics: Arc<PipelineMetrics>,
    ) -> Result<Self> {
        config.validate()?;

        let (event_tx, event_rx) = mpsc::channel(config.buffer_size);
        let shutdown = CancellationToken::new();

        info!(
            transport = transport.name(),
            buffer_size = config.buffer_size,
            max_batch_size = config.max_batch_size,
            flush_interval_ms = config.flush_interval_ms,
            "starting batch emitter"
        );

        let worker = tokio::spawn(Self::batch_processor(
            config.clone(),
            event_rx,
            transport,
            shutdown.clone(),
            metrics.clone(),
        ));

        Ok(Self {
            config,
            event_tx,
            state: AtomicU8::new(EmitterState::Running as u8),
            shutdown,
            worker: Mutex::new(Some(worker)),
            metrics,
        })
    }

    pub fn config(&self) -> &EmitterConfig {
        &self.config
    }

    pub fn state(&self) -> EmitterState {
        self.state.load(Ordering::Acquire).into()
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.metrics.clone()
    }

    pub fn stats(&self) -> EmitterStats {
        EmitterStats {
            enqueued: self.metrics.events_enqueued.get(),
            dropped: self.metrics.events_dropped.get(),
            rejected: self.metrics.events_rejected.get(),
            sent: self.metrics.events_sent.get(),
            batches: self.metrics.batches_sent.get(),
            errors: self.metrics.transport_errors.get(),
        }
    }

    /// Queue an event for delivery.
    ///
    /// Never blocks. Invalid events and events arriving after shutdown began
    /// are rejected; a full queue drops the event.
    ///
    /// # Panics
    ///
    /// When the queue is full and `panic_on_drop` is configured.
    pub fn emit(&self, event: UsageEvent) {
        let _ = self.enqueue(event, self.config.panic_on_drop);
    }

    /// Queue an event without ever panicking. A full queue is counted as a
    /// drop and reported as [`TollgateError::QueueFull`].
    pub fn try_emit(&self, event: UsageEvent) -> Result<()> {
        self.enqueue(event, false)
    }

    fn enqueue(&self, event: UsageEvent, panic_on_full: bool) -> Result<()> {
        if self.state() != EmitterState::Running {
            warn!(service = %event.service, "emitter is shutting down, cannot track event");
            self.metrics.events_rejected.inc();
            return Err(TollgateError::Closed("emitter is shutting down"));
        }

        if let Err(e) = event.validate() {
            warn!(service = %event.service, method = %event.method, error = %e, "dropping invalid event");
            self.metrics.events_rejected.inc();
            return Err(e);
        }

        match self.event_tx.try_send(event) {
            Ok(()) => {
                self.metrics.events_enqueued.inc();
                Ok(())
            }
            Err(TrySendError::Full(event)) => {
                if panic_on_full {
                    panic!(
                        "failed to queue metering event for {}: queue of {} is full",
                        event.service, self.config.buffer_size
                    );
                }
                debug!(service = %event.service, "queue full, dropping event");
                self.metrics.events_dropped.inc();
                Err(TollgateError::QueueFull(self.config.buffer_size))
            }
            Err(TrySendError::Closed(event)) => {
                warn!(service = %event.service, "emitter queue closed, cannot track event");
                self.metrics.events_rejected.inc();
                Err(TollgateError::Closed("emitter queue closed"))
            }
        }
    }

    /// Stop accepting events, drain the queue, send the final batch and
    /// close the transport.
    pub async fn shutdown(&self) {
        let _ = self.state.compare_exchange(
            EmitterState::Running as u8,
            EmitterState::Terminating as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.shutdown.cancel();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            info!("received shutdown signal, waiting for batch worker to drain");
            if let Err(e) = worker.await {
                error!("batch worker failed: {}", e);
            }
            self.state
                .store(EmitterState::Stopped as u8, Ordering::Release);
        }
    }

    /// Background batch processor
    async fn batch_processor(
        config: EmitterConfig,
        mut event_rx: mpsc::Receiver<UsageEvent>,
        transport: Arc<dyn Transport>,
        shutdown: CancellationToken,
        metrics: Arc<PipelineMetrics>,
    ) {
        let mut active: Vec<UsageEvent> = Vec::with_capacity(config.max_batch_size);
        let flush_interval = Duration::from_millis(config.flush_interval_ms);
        let mut flush_timer = tokio::time::interval(flush_interval);
        flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                // Periodic flush
                _ = flush_timer.tick() => {
                    if !active.is_empty() {
                        debug!(count = active.len(), "emitting events after flush delay");
                        Self::send_batch(&*transport, &mut active, &metrics).await;
                    }
                }

                event = event_rx.recv() => {
                    match event {
                        Some(event) => {
                            active.push(event);
                            if active.len() >= config.max_batch_size {
                                Self::send_batch(&*transport, &mut active, &metrics).await;
                                flush_timer.reset();
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        Self::drain(&config, event_rx, &*transport, &mut active, &metrics).await;

        if let Err(e) = transport.close().await {
            warn!(transport = transport.name(), "failed to close transport: {}", e);
        }
        info!("batch worker stopped");
    }

    async fn drain(
        config: &EmitterConfig,
        mut event_rx: mpsc::Receiver<UsageEvent>,
        transport: &dyn Transport,
        active: &mut Vec<UsageEvent>,
        metrics: &PipelineMetrics,
    ) {
        event_rx.close();
        let started = Instant::now();
        let mut drained = 0usize;

        while let Some(event) = event_rx.recv().await {
            drained += 1;
            active.push(event);
            if active.len() >= config.max_batch_size {
                Self::send_batch(transport, active, metrics).await;
            }
        }

        info!(drained, last_batch = active.len(), "sending last events");
        Self::send_batch(transport, active, metrics).await;
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "event flush complete");
    }

    async fn send_batch(
        transport: &dyn Transport,
        active: &mut Vec<UsageEvent>,
        metrics: &PipelineMetrics,
    ) {
        if active.is_empty() {
            return;
        }

        let batch = EventBatch::new(std::mem::take(active));
        let count = batch.len() as u64;
        debug!(batch_id = %batch.batch_id, count, "tracking events");

        match transport.send(&batch).await {
            Ok(()) => {
                metrics.batches_sent.inc();
                metrics.events_sent.inc_by(count);
            }
            Err(e) => {
                metrics.transport_errors.inc();
                warn!(transport = transport.name(), batch_id = %batch.batch_id, count, "failed to emit events: {}", e);
            }
        }
    }
}

impl EventSink for BatchEmitter {
    /// Never panics; overload is returned to the caller.
    fn accept(&self, event: UsageEvent) -> Result<()> {
        self.try_emit(event)
    }
}

impl Drop for BatchEmitter {
    fn drop(&mut self) {
        // an emitter dropped without shutdown still drains in the background
        self.shutdown.cancel();
    }
}
