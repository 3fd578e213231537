//! # Tollgate Common
//!
//! Shared event model, merge rules, and errors for the Tollgate usage
//! metering pipeline.
//!
//! ## Core Types
//!
//! - [`UsageEvent`]: one usage observation with identity attributes, metrics and metadata
//! - [`GroupKey`]: the attributes that decide whether two events are merged
//! - [`TollgateError`]: unified error type

pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{MeterError, Result, TollgateError, ValidationError};
pub use types::event::{GroupKey, UsageEvent};

/// Tollgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Network value that makes a pipeline take the network from each request scope
pub const MULTI_NETWORK: &str = "multi";

/// Well-known metric names
pub mod metric {
    pub const REQUESTS_COUNT: &str = "requests_count";
    pub const RESPONSES_COUNT: &str = "responses_count";
    pub const INGRESS_BYTES: &str = "ingress_bytes";
    pub const EGRESS_BYTES: &str = "egress_bytes";
    pub const READ_BYTES: &str = "read_bytes";
    pub const WRITTEN_BYTES: &str = "written_bytes";
    pub const RATE_LIMIT_HIT_COUNT: &str = "rate_limit_hit_count";
    pub const IDLE_TIME: &str = "idle_time";
}
