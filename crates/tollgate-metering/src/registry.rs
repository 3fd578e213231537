//! Transport registry
//!
//! Maps a DSN scheme (`grpc`, `logger`, `null`, ...) to a factory building
//! the matching [`Transport`]. The registry is a plain value: build one,
//! register what the process needs, and pass it where pipelines are created.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tollgate_common::{Result, TollgateError, MULTI_NETWORK};
use tracing::debug;

use crate::config::MeteringConfig;
use crate::transport::{
    GrpcTransport, GrpcTransportConfig, LoggerTransport, NullTransport, Transport,
};

/// Parsed `scheme://host/path?key=value` string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub params: BTreeMap<String, String>,
}

impl Dsn {
    pub fn parse(input: &str) -> Result<Self> {
        let (scheme, rest) = input.split_once("://").ok_or_else(|| {
            TollgateError::Config(format!("invalid dsn {:?}: expected scheme://", input))
        })?;
        if scheme.is_empty()
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(TollgateError::Config(format!(
                "invalid dsn {:?}: bad scheme",
                input
            )));
        }

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, query),
            None => (rest, ""),
        };
        let (host, path) = match location.split_once('/') {
            Some((host, path)) => (host, path),
            None => (location, ""),
        };

        let mut params = BTreeMap::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            params.insert(key.to_string(), value.to_string());
        }

        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            path: path.trim_matches('/').to_string(),
            params,
        })
    }

    /// Query parameter, treating empty values as absent
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Parse a query parameter, `None` when absent
    pub fn parse_param<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        match self.param(key) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|e| {
                TollgateError::Config(format!("invalid {} value {:?}: {}", key, raw, e))
            }),
        }
    }

    /// `true` only for the literal value `true`
    pub fn flag(&self, key: &str) -> bool {
        self.param(key) == Some("true")
    }
}

/// Builds a transport from the pipeline configuration
pub type TransportFactory =
    Box<dyn Fn(&Dsn, &MeteringConfig) -> Result<Arc<dyn Transport>> + Send + Sync>;

/// Scheme name to transport factory
#[derive(Default)]
pub struct TransportRegistry {
    factories: HashMap<String, TransportFactory>,
}

impl TransportRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `grpc`, `logger` and `null` transports
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("grpc", Box::new(grpc_factory));
        registry.register("logger", Box::new(logger_factory));
        registry.register("null", Box::new(null_factory));
        registry
    }

    /// Register a factory, replacing any previous one for the scheme
    pub fn register(&mut self, scheme: impl Into<String>, factory: TransportFactory) {
        self.factories.insert(scheme.into(), factory);
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.factories.contains_key(scheme)
    }

    /// Build the transport selected by `config.dsn`
    pub fn build(&self, config: &MeteringConfig) -> Result<Arc<dyn Transport>> {
        let dsn = Dsn::parse(&config.dsn)?;
        let factory = self.factories.get(&dsn.scheme).ok_or_else(|| {
            TollgateError::Config(format!(
                "no metering transport named {:?} is registered",
                dsn.scheme
            ))
        })?;
        debug!(scheme = %dsn.scheme, "building metering transport");
        factory(&dsn, config)
    }
}

fn grpc_factory(dsn: &Dsn, config: &MeteringConfig) -> Result<Arc<dyn Transport>> {
    if dsn.host.is_empty() {
        return Err(TollgateError::Config(
            "endpoint not specified (as hostname)".into(),
        ));
    }
    match config.network.as_deref() {
        Some(network) if !network.is_empty() => {}
        _ => {
            return Err(TollgateError::Config(format!(
                "network not specified (as query param, use {:?} to read it per request)",
                MULTI_NETWORK
            )))
        }
    }

    let mut grpc = GrpcTransportConfig {
        endpoint: dsn.host.clone(),
        wire: config.wire.clone(),
        ..Default::default()
    };
    if let Some(timeout_ms) = dsn.parse_param("timeout")? {
        grpc.timeout_ms = timeout_ms;
    }
    Ok(Arc::new(GrpcTransport::connect_lazy(grpc)?))
}

fn null_factory(_dsn: &Dsn, _config: &MeteringConfig) -> Result<Arc<dyn Transport>> {
    Ok(Arc::new(NullTransport::new()))
}

fn logger_factory(dsn: &Dsn, _config: &MeteringConfig) -> Result<Arc<dyn Transport>> {
    let transport = match dsn.param("level") {
        Some(level) => LoggerTransport::from_level_name(level)?,
        None => LoggerTransport::default(),
    };
    Ok(Arc::new(transport))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dsn() {
        let dsn = Dsn::parse("cloud-gcp://my-project/my-topic?networkId=eth&warnOnErrors=true")
            .unwrap();
        assert_eq!(dsn.scheme, "cloud-gcp");
        assert_eq!(dsn.host, "my-project");
        assert_eq!(dsn.path, "my-topic");
        assert_eq!(dsn.param("networkId"), Some("eth"));
        assert!(dsn.flag("warnOnErrors"));
        assert!(!dsn.flag("missing"));
    }

    #[test]
    fn test_parse_dsn_without_host() {
        let dsn = Dsn::parse("logger://").unwrap();
        assert_eq!(dsn.scheme, "logger");
        assert!(dsn.host.is_empty());
        assert!(dsn.params.is_empty());
    }

    #[test]
    fn test_parse_dsn_rejects_malformed() {
        assert!(Dsn::parse("grpc:localhost9010?buffer=100000&network=eth-mainnet").is_err());
        assert!(Dsn::parse("://localhost").is_err());
        assert!(Dsn::parse("gr pc://localhost").is_err());
    }

    #[test]
    fn test_parse_param() {
        let dsn = Dsn::parse("grpc://localhost:9010?buffer=25&delay=abc").unwrap();
        assert_eq!(dsn.parse_param::<usize>("buffer").unwrap(), Some(25));
        assert_eq!(dsn.parse_param::<usize>("batch").unwrap(), None);
        assert!(dsn.parse_param::<u64>("delay").is_err());
    }

    #[test]
    fn test_unknown_scheme_is_config_error() {
        let registry = TransportRegistry::with_defaults();
        let config = MeteringConfig::from_dsn("kafka://broker:9092").unwrap();
        assert!(matches!(
            registry.build(&config),
            Err(TollgateError::Config(_))
        ));
    }

    #[test]
    fn test_default_schemes() {
        let registry = TransportRegistry::with_defaults();
        assert!(registry.contains("grpc"));
        assert!(registry.contains("logger"));
        assert!(registry.contains("null"));

        let config = MeteringConfig::from_dsn("null://").unwrap();
        assert_eq!(registry.build(&config).unwrap().name(), "null");

        let config = MeteringConfig::from_dsn("logger://?level=debug").unwrap();
        assert_eq!(registry.build(&config).unwrap().name(), "logger");

        let config = MeteringConfig::from_dsn("logger://?level=shout").unwrap();
        assert!(registry.build(&config).is_err());
    }

    #[test]
    fn test_grpc_requires_endpoint_and_network() {
        let registry = TransportRegistry::with_defaults();

        let config = MeteringConfig::from_dsn("grpc://?network=eth-mainnet").unwrap();
        let err = registry.build(&config).err().unwrap();
        assert!(err.to_string().contains("endpoint not specified"));

        let config = MeteringConfig::from_dsn("grpc://localhost:9010").unwrap();
        let err = registry.build(&config).err().unwrap();
        assert!(err.to_string().contains("network not specified"));
    }

    #[tokio::test]
    async fn test_grpc_builds_lazily() {
        let registry = TransportRegistry::with_defaults();
        let config =
            MeteringConfig::from_dsn("grpc://localhost:9010?network=eth-mainnet&timeout=250")
                .unwrap();
        assert_eq!(registry.build(&config).unwrap().name(), "grpc");
    }

    #[test]
    fn test_custom_factory() {
        let mut registry = TransportRegistry::new();
        assert!(!registry.contains("null"));
        registry.register(
            "devnull",
            Box::new(|_: &Dsn, _: &MeteringConfig| -> Result<Arc<dyn Transport>> {
                Ok(Arc::new(NullTransport::new()))
            }),
        );

        let config = MeteringConfig::from_dsn("devnull://").unwrap();
        assert_eq!(registry.build(&config).unwrap().name(), "null");
    }
}
