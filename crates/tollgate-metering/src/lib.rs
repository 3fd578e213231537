//! # Tollgate Metering
//!
//! Usage event aggregation and buffered batch delivery.
//!
//! ## Pipeline
//!
//! ```text
//! producer -> Metering::emit(scope, event)
//!          -> Accumulator::merge      (optional, per group key)
//!          -> BatchEmitter::emit      (bounded queue, never blocks)
//!          -> Transport::send         (batched by size and time)
//! ```
//!
//! Producers track bytes on a [`BytesMeter`] carried by the [`RequestScope`]
//! and fold the deltas into the event before emitting it.

pub mod accumulator;
pub mod config;
pub mod emitter;
pub mod generated;
pub mod meter;
pub mod metrics;
pub mod pipeline;
pub mod registry;
pub mod scope;
pub mod transport;
pub mod wire;

pub use accumulator::{Accumulator, EventSink, DEFAULT_FLUSH_INTERVAL};
pub use config::{AccumulatorSettings, MeteringConfig};
pub use emitter::{BatchEmitter, EmitterConfig, EmitterState, EmitterStats};
pub use generated::metering::v1 as proto;
pub use meter::{BytesMeter, Meter, NoopMeter};
pub use metrics::PipelineMetrics;
pub use pipeline::{Metering, StatusCounters};
pub use registry::{Dsn, TransportFactory, TransportRegistry};
pub use scope::RequestScope;
pub use transport::{EventBatch, Transport};
pub use wire::WireOptions;
