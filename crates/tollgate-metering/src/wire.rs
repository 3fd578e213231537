//! Event to wire mapping
//!
//! Pure conversion from [`UsageEvent`] to the collector's protobuf shape.
//! Output depends only on the input event and options, except that an unset
//! timestamp becomes "now".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tollgate_common::UsageEvent;

use crate::generated::metering::v1 as proto;

/// Options for the wire representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireOptions {
    /// Emit metrics whose value is exactly zero
    pub include_zero_metrics: bool,
}

impl Default for WireOptions {
    fn default() -> Self {
        Self {
            include_zero_metrics: true,
        }
    }
}

/// Convert a chrono timestamp to protobuf
pub fn timestamp_to_proto(ts: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: ts.timestamp(),
        nanos: ts.timestamp_subsec_nanos() as i32,
    }
}

/// Convert an event to its protobuf representation
pub fn to_proto(event: &UsageEvent, options: &WireOptions) -> proto::Event {
    let metrics = event
        .metrics
        .iter()
        .filter(|(_, value)| options.include_zero_metrics || **value != 0.0)
        .map(|(key, value)| proto::Metric {
            key: key.clone(),
            value: *value,
        })
        .collect();

    let metadata = event
        .metadata
        .iter()
        .map(|(key, value)| proto::MetadataField {
            key: key.clone(),
            value: value.clone(),
        })
        .collect();

    proto::Event {
        service: event.service.clone(),
        method: event.method.clone(),
        network: event.network.clone(),
        user_id: event.user_id.clone(),
        api_key_id: event.api_key_id.clone(),
        api_key_usage: event.api_key_usage.clone(),
        ip_address: event.ip_address.clone(),
        metrics,
        metadata,
        timestamp: Some(timestamp_to_proto(event.timestamp.unwrap_or_else(Utc::now))),
    }
}

/// Convert a slice of events into a batch request
pub fn batch_to_proto(events: &[UsageEvent], options: &WireOptions) -> proto::Events {
    proto::Events {
        events: events.iter().map(|e| to_proto(e, options)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use prost::Message;
    use tollgate_common::metric;

    fn event() -> UsageEvent {
        UsageEvent::new("sf.firehose.v1/Blocks", "Blocks")
            .with_network("eth-mainnet")
            .with_user("0bizy1111111111111111")
            .with_api_key("2323", "live")
            .with_ip_address("192.168.1.1")
            .with_metric(metric::READ_BYTES, 12.0)
            .with_metric(metric::EGRESS_BYTES, 0.0)
            .with_metadata("region", "us-east")
            .with_timestamp(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
    }

    #[test]
    fn test_identity_fields_copied() {
        let pb = to_proto(&event(), &WireOptions::default());
        assert_eq!(pb.service, "sf.firehose.v1/Blocks");
        assert_eq!(pb.method, "Blocks");
        assert_eq!(pb.network, "eth-mainnet");
        assert_eq!(pb.user_id, "0bizy1111111111111111");
        assert_eq!(pb.api_key_id, "2323");
        assert_eq!(pb.api_key_usage, "live");
        assert_eq!(pb.ip_address, "192.168.1.1");
        assert_eq!(pb.metadata.len(), 1);
        assert_eq!(pb.timestamp.unwrap().seconds, 1704164645);
    }

    #[test]
    fn test_zero_metrics_configurable() {
        let with_zero = to_proto(&event(), &WireOptions::default());
        let keys: Vec<_> = with_zero.metrics.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec![metric::EGRESS_BYTES, metric::READ_BYTES]);

        let without_zero = to_proto(
            &event(),
            &WireOptions {
                include_zero_metrics: false,
            },
        );
        assert_eq!(without_zero.metrics.len(), 1);
        assert_eq!(without_zero.metrics[0].key, metric::READ_BYTES);
    }

    #[test]
    fn test_deterministic_encoding() {
        let a = to_proto(&event(), &WireOptions::default()).encode_to_vec();
        let b = to_proto(&event(), &WireOptions::default()).encode_to_vec();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_timestamp_defaults_to_now() {
        let before = Utc::now().timestamp();
        let pb = to_proto(&UsageEvent::new("svc", "m"), &WireOptions::default());
        assert!(pb.timestamp.unwrap().seconds >= before);
    }
}
