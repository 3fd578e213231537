//! Per-request scope
//!
//! A [`RequestScope`] travels with a request through the handler chain and
//! carries the request's meter and network. Lookups never fail: a scope
//! without a meter hands out the shared [`NoopMeter`](crate::meter::NoopMeter).

use std::sync::Arc;

use crate::meter::{BytesMeter, Meter, NOOP_METER};

/// Request-scoped metering state
#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    meter: Option<Arc<dyn Meter>>,
    network: Option<String>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a fresh [`BytesMeter`] unless a real meter is already attached
    pub fn with_bytes_meter(self) -> Self {
        if self.meter.as_ref().is_some_and(|m| !m.is_noop()) {
            return self;
        }
        self.with_meter(Arc::new(BytesMeter::new()))
    }

    /// Attach an existing meter
    pub fn with_meter(mut self, meter: Arc<dyn Meter>) -> Self {
        self.meter = Some(meter);
        self
    }

    /// Register a named counter on the scope's meter, attaching one if needed
    pub fn with_counter(self, name: &str) -> Self {
        let scope = self.with_bytes_meter();
        scope.bytes_meter().add_counter(name);
        scope
    }

    /// Set the network for events emitted in this scope
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// The attached meter, or the no-op meter
    pub fn bytes_meter(&self) -> &dyn Meter {
        match &self.meter {
            Some(meter) => &**meter,
            None => &NOOP_METER,
        }
    }

    /// Shared handle to the attached meter
    pub fn meter_handle(&self) -> Option<Arc<dyn Meter>> {
        self.meter.clone()
    }

    /// Network carried by the scope; empty strings count as unset
    pub fn network(&self) -> Option<&str> {
        self.network.as_deref().filter(|n| !n.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter::NoopMeter;

    #[test]
    fn test_missing_meter_is_noop() {
        let scope = RequestScope::new();
        assert!(scope.bytes_meter().is_noop());
        assert!(scope.meter_handle().is_none());
        scope.bytes_meter().add_bytes_written(10).unwrap();
        assert_eq!(scope.bytes_meter().bytes_written(), 0);
    }

    #[test]
    fn test_with_bytes_meter_keeps_existing() {
        let scope = RequestScope::new().with_bytes_meter();
        scope.bytes_meter().add_bytes_read(5).unwrap();

        let scope = scope.with_bytes_meter();
        assert_eq!(scope.bytes_meter().bytes_read(), 5);
    }

    #[test]
    fn test_with_bytes_meter_replaces_noop() {
        let scope = RequestScope::new()
            .with_meter(Arc::new(NoopMeter))
            .with_bytes_meter();
        assert!(!scope.bytes_meter().is_noop());
    }

    #[test]
    fn test_clones_share_meter() {
        let scope = RequestScope::new().with_bytes_meter();
        let child = scope.clone();
        child.bytes_meter().add_bytes_written(64).unwrap();
        assert_eq!(scope.bytes_meter().bytes_written(), 64);
    }

    #[test]
    fn test_with_counter() {
        let scope = RequestScope::new().with_counter("messages");
        scope.bytes_meter().count_inc("messages", 2);
        assert_eq!(scope.bytes_meter().count("messages"), 2);
    }

    #[test]
    fn test_network() {
        assert_eq!(RequestScope::new().network(), None);
        assert_eq!(RequestScope::new().with_network("").network(), None);
        assert_eq!(
            RequestScope::new().with_network("eth-mainnet").network(),
            Some("eth-mainnet")
        );
    }
}
