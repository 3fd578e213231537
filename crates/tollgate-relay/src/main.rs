//! Tollgate Relay - reads JSON usage events from stdin, one per line, and
//! forwards them through a metering pipeline configured from the environment

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tollgate_common::UsageEvent;
use tollgate_metering::{Metering, MeteringConfig, RequestScope, TransportRegistry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting Tollgate Relay v{}", tollgate_common::VERSION);

    let config = MeteringConfig::load()?;
    let registry = TransportRegistry::with_defaults();
    let metering = Metering::from_config(config, &registry)?;

    let scope = RequestScope::new();
    let stdin = BufReader::new(tokio::io::stdin());

    tokio::select! {
        result = relay(stdin, &metering, &scope) => {
            let (forwarded, skipped) = result?;
            tracing::info!(forwarded, skipped, "input closed");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received interrupt");
        }
    }

    tracing::info!("Shutting down...");
    metering.shutdown().await;

    let status = metering.status();
    tracing::info!(total = status.total, errors = status.errors, "Tollgate Relay stopped");

    Ok(())
}

/// Forward every parseable line to `metering`. Returns `(forwarded, skipped)`.
async fn relay<R>(input: R, metering: &Metering, scope: &RequestScope) -> anyhow::Result<(u64, u64)>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut forwarded = 0u64;
    let mut skipped = 0u64;

    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Some(Ok(event)) => {
                metering.emit(scope, event);
                forwarded += 1;
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "skipping malformed event");
                skipped += 1;
            }
            None => {}
        }
    }

    Ok((forwarded, skipped))
}

/// `None` for blank lines
fn parse_line(line: &str) -> Option<tollgate_common::Result<UsageEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line).map_err(Into::into))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tollgate_metering::transport::NullTransport;

    #[test]
    fn test_parse_line() {
        assert!(parse_line("   ").is_none());
        assert!(matches!(
            parse_line("{not json"),
            Some(Err(tollgate_common::TollgateError::Serialization(_)))
        ));

        let event = parse_line(r#"{"service":"svc","method":"m","network":"eth-mainnet","metrics":{"requests_count":1.0}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(event.service, "svc");
        assert_eq!(event.metric("requests_count"), Some(1.0));
        assert!(event.timestamp.is_none());
    }

    #[tokio::test]
    async fn test_relay_forwards_lines() {
        let transport = Arc::new(NullTransport::new());
        let config = MeteringConfig {
            dsn: "null://".into(),
            network: Some("eth-mainnet".into()),
            ..Default::default()
        };
        let metering = Metering::new(config, transport.clone()).unwrap();

        let input: &[u8] = b"{\"service\":\"svc\",\"method\":\"a\"}\n\n{oops\n{\"service\":\"svc\",\"method\":\"b\"}\n";
        let (forwarded, skipped) = relay(input, &metering, &RequestScope::new())
            .await
            .unwrap();
        metering.shutdown().await;

        assert_eq!((forwarded, skipped), (2, 1));
        assert_eq!(transport.events_seen(), 2);
    }
}
