//! Pipeline configuration

use serde::{Deserialize, Serialize};
use tollgate_common::{Result, TollgateError};

use crate::accumulator::DEFAULT_FLUSH_INTERVAL;
use crate::emitter::EmitterConfig;
use crate::registry::Dsn;
use crate::wire::WireOptions;

/// Metering pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeteringConfig {
    /// Transport selection, e.g. `grpc://collector:9010`, `logger://`, `null://`
    pub dsn: String,
    /// Fixed network, or `multi` to read it from each request scope
    pub network: Option<String>,
    /// Batch emitter settings
    pub emitter: EmitterConfig,
    /// Accumulation settings
    pub accumulator: AccumulatorSettings,
    /// Wire representation options
    pub wire: WireOptions,
}

impl Default for MeteringConfig {
    fn default() -> Self {
        Self {
            dsn: "logger://".to_string(),
            network: None,
            emitter: EmitterConfig::default(),
            accumulator: AccumulatorSettings::default(),
            wire: WireOptions::default(),
        }
    }
}

/// Accumulator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccumulatorSettings {
    /// Merge same-key events before batching
    pub enabled: bool,
    /// Merge window in milliseconds
    pub flush_interval_ms: u64,
}

impl Default for AccumulatorSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL.as_millis() as u64,
        }
    }
}

impl MeteringConfig {
    /// Build a configuration from a DSN.
    ///
    /// Recognized query parameters: `network`, `buffer`, `batch`, `delay`
    /// (ms), `panicOnDrop`, `accumulate`, `accumulateDelay` (ms), `emitZero`.
    /// Transport-specific parameters are left for the transport factory.
    pub fn from_dsn(dsn: &str) -> Result<Self> {
        let parsed = Dsn::parse(dsn)?;
        let mut cfg = Self {
            dsn: dsn.to_string(),
            network: parsed.param("network").map(str::to_string),
            ..Default::default()
        };

        if let Some(v) = parsed.parse_param("buffer")? {
            cfg.emitter.buffer_size = v;
        }
        if let Some(v) = parsed.parse_param("batch")? {
            cfg.emitter.max_batch_size = v;
        }
        if let Some(v) = parsed.parse_param("delay")? {
            cfg.emitter.flush_interval_ms = v;
        }
        cfg.emitter.panic_on_drop = parsed.flag("panicOnDrop");

        cfg.accumulator.enabled = parsed.flag("accumulate");
        if let Some(v) = parsed.parse_param("accumulateDelay")? {
            cfg.accumulator.flush_interval_ms = v;
        }

        if parsed.param("emitZero") == Some("false") {
            cfg.wire.include_zero_metrics = false;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from environment and files
    pub fn load() -> Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();

        let dsn = std::env::var("TOLLGATE_DSN").unwrap_or_else(|_| "logger://".to_string());
        let mut cfg = Self::from_dsn(&dsn)?;

        if let Ok(network) = std::env::var("TOLLGATE_NETWORK") {
            cfg.network = Some(network);
        }
        if let Some(v) = env_parse("TOLLGATE_BUFFER_SIZE")? {
            cfg.emitter.buffer_size = v;
        }
        if let Some(v) = env_parse("TOLLGATE_BATCH_SIZE")? {
            cfg.emitter.max_batch_size = v;
        }
        if let Some(v) = env_parse("TOLLGATE_FLUSH_INTERVAL_MS")? {
            cfg.emitter.flush_interval_ms = v;
        }
        if let Some(v) = env_parse("TOLLGATE_PANIC_ON_DROP")? {
            cfg.emitter.panic_on_drop = v;
        }
        if let Some(v) = env_parse("TOLLGATE_ACCUMULATE")? {
            cfg.accumulator.enabled = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.emitter.validate()?;
        if self.accumulator.enabled && self.accumulator.flush_interval_ms == 0 {
            return Err(TollgateError::Config(
                "accumulator flush interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| TollgateError::Config(format!("invalid {} value {:?}: {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}
