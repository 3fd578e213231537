//! gRPC collector transport
//!
//! Sends each batch as one unary `sf.metering.v1.Metering/Emit` call. The
//! channel connects lazily, so constructing the transport never blocks on
//! the network.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tollgate_common::{Result, TollgateError};
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info, instrument};

use super::{EventBatch, Transport};
use crate::generated::metering::v1 as proto;
use crate::wire::{self, WireOptions};

/// gRPC transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrpcTransportConfig {
    /// Collector address, `host:port` or a full URI
    pub endpoint: String,
    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
    /// Wire representation options
    pub wire: WireOptions,
}

impl Default for GrpcTransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "localhost:9010".to_string(),
            timeout_ms: 5000,
            wire: WireOptions::default(),
        }
    }
}

/// Transport pushing batches to a gRPC metering collector
pub struct GrpcTransport {
    channel: Channel,
    config: GrpcTransportConfig,
}

impl GrpcTransport {
    /// Create a lazily-connected transport. Must be called inside a tokio runtime.
    pub fn connect_lazy(config: GrpcTransportConfig) -> Result<Self> {
        let uri = if config.endpoint.contains("://") {
            config.endpoint.clone()
        } else {
            format!("http://{}", config.endpoint)
        };

        let endpoint = Endpoint::from_shared(uri).map_err(|e| {
            TollgateError::Config(format!("invalid endpoint {:?}: {}", config.endpoint, e))
        })?;
        let channel = endpoint
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_lazy();

        info!(endpoint = %config.endpoint, "gRPC metering transport ready");
        Ok(Self { channel, config })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    fn name(&self) -> &'static str {
        "grpc"
    }

    #[instrument(skip(self, batch), fields(batch_id = %batch.batch_id, events = batch.len()))]
    async fn send(&self, batch: &EventBatch) -> Result<()> {
        let request = wire::batch_to_proto(&batch.events, &self.config.wire);

        let mut client = tonic::client::Grpc::new(self.channel.clone());
        client.ready().await.map_err(|e| {
            TollgateError::Transport(format!("metering service was not ready: {}", e))
        })?;

        let codec: ProstCodec<proto::Events, ()> = ProstCodec::default();
        let path = PathAndQuery::from_static(proto::EMIT_PATH);
        client
            .unary(tonic::Request::new(request), path, codec)
            .await
            .map_err(|status| TollgateError::Transport(format!("emit failed: {}", status)))?;

        debug!("batch delivered");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        info!(endpoint = %self.config.endpoint, "closing gRPC metering transport");
        Ok(())
    }
}
