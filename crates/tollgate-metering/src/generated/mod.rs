//! Generated protobuf types for the metering collector
//!
//! These types are designed to match the `sf.metering.v1` proto definitions

pub mod metering {
    pub mod v1 {
        use prost::Message;

        /// Single named metric value
        #[derive(Clone, PartialEq, Message)]
        pub struct Metric {
            #[prost(string, tag = "1")]
            pub key: String,
            #[prost(double, tag = "2")]
            pub value: f64,
        }

        /// Metadata key/value pair
        #[derive(Clone, PartialEq, Message)]
        pub struct MetadataField {
            #[prost(string, tag = "1")]
            pub key: String,
            #[prost(string, tag = "2")]
            pub value: String,
        }

        /// Usage event as received by the collector
        #[derive(Clone, PartialEq, Message)]
        pub struct Event {
            #[prost(string, tag = "1")]
            pub service: String,
            #[prost(string, tag = "2")]
            pub method: String,
            #[prost(string, tag = "3")]
            pub network: String,
            #[prost(string, tag = "4")]
            pub user_id: String,
            #[prost(string, tag = "5")]
            pub api_key_id: String,
            #[prost(string, tag = "6")]
            pub api_key_usage: String,
            #[prost(string, tag = "7")]
            pub ip_address: String,
            #[prost(message, repeated, tag = "8")]
            pub metrics: Vec<Metric>,
            #[prost(message, repeated, tag = "9")]
            pub metadata: Vec<MetadataField>,
            #[prost(message, optional, tag = "10")]
            pub timestamp: Option<prost_types::Timestamp>,
        }

        /// Batch request for `Metering/Emit`
        #[derive(Clone, PartialEq, Message)]
        pub struct Events {
            #[prost(message, repeated, tag = "1")]
            pub events: Vec<Event>,
        }

        /// Fully-qualified path of the emit RPC
        pub const EMIT_PATH: &str = "/sf.metering.v1.Metering/Emit";
    }
}
