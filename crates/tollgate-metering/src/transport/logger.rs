//! Transport that writes events to the log

use async_trait::async_trait;
use tollgate_common::{Result, TollgateError, UsageEvent};
use tracing::Level;

use super::{EventBatch, Transport};

/// Logs each event through `tracing`
#[derive(Debug, Clone)]
pub struct LoggerTransport {
    level: Level,
}

impl LoggerTransport {
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Parse a level name (`trace`, `debug`, `info`, `warn`, `error`)
    pub fn from_level_name(name: &str) -> Result<Self> {
        let level = name
            .parse::<Level>()
            .map_err(|_| TollgateError::Config(format!("invalid log level {:?}", name)))?;
        Ok(Self::new(level))
    }

    pub fn level(&self) -> Level {
        self.level
    }

    fn log_event(&self, batch_id: &uuid::Uuid, event: &UsageEvent) {
        let metrics = serde_json::to_string(&event.metrics).unwrap_or_default();
        macro_rules! emit {
            ($lvl:expr) => {
                tracing::event!(
                    $lvl,
                    batch_id = %batch_id,
                    service = %event.service,
                    method = %event.method,
                    network = %event.network,
                    user_id = %event.user_id,
                    api_key_id = %event.api_key_id,
                    ip_address = %event.ip_address,
                    metrics = %metrics,
                    "emit"
                )
            };
        }
        match self.level {
            Level::TRACE => emit!(Level::TRACE),
            Level::DEBUG => emit!(Level::DEBUG),
            Level::WARN => emit!(Level::WARN),
            Level::ERROR => emit!(Level::ERROR),
            _ => emit!(Level::INFO),
        }
    }
}

impl Default for LoggerTransport {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

#[async_trait]
impl Transport for LoggerTransport {
    fn name(&self) -> &'static str {
        "logger"
    }

    async fn send(&self, batch: &EventBatch) -> Result<()> {
        for event in &batch.events {
            self.log_event(&batch.batch_id, event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        assert_eq!(LoggerTransport::from_level_name("debug").unwrap().level(), Level::DEBUG);
        assert!(LoggerTransport::from_level_name("loud").is_err());
    }

    #[tokio::test]
    async fn test_send_never_fails() {
        let transport = LoggerTransport::default();
        let batch = EventBatch::new(vec![UsageEvent::new("svc", "m").with_network("n")]);
        assert!(transport.send(&batch).await.is_ok());
    }
}
