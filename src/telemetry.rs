//! Telemetry initialization: `tracing` always, an optional OTLP exporter
//! behind the `otel` feature.
//!
//! Controlled by `OTEL_EXPORTER_OTLP_ENDPOINT`: unset means no-op (events
//! still go through `tracing`'s dispatcher, just with no subscriber
//! installed beyond whatever the host process set up), `"stderr"` means
//! structured JSON to stderr, anything else is treated as an OTLP collector
//! URL.

use std::env;

/// RAII guard returned by [`init`]. Dropping it flushes and shuts down any
/// exporters that were started.
pub struct TelemetryGuard {
    #[cfg(feature = "otel")]
    otel_providers: Option<OtelProviders>,
}

#[cfg(feature = "otel")]
struct OtelProviders {
    tracer_provider: opentelemetry_sdk::trace::SdkTracerProvider,
    logger_provider: opentelemetry_sdk::logs::SdkLoggerProvider,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otel")]
        if let Some(providers) = self.otel_providers.take() {
            if let Err(e) = providers.tracer_provider.shutdown() {
                eprintln!("conduit: error shutting down tracer provider: {e}");
            }
            if let Err(e) = providers.logger_provider.shutdown() {
                eprintln!("conduit: error shutting down logger provider: {e}");
            }
        }
    }
}

/// Initialize telemetry based on `OTEL_EXPORTER_OTLP_ENDPOINT`.
///
/// # Errors
/// Returns an error if a `tracing` subscriber is already installed, or if
/// building the OTLP exporter fails.
pub fn init() -> anyhow::Result<TelemetryGuard> {
    match env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        Ok(endpoint) if endpoint == "stderr" => init_stderr(),
        Ok(endpoint) => init_otlp(&endpoint),
        Err(_) => init_noop(),
    }
}

/// Install no subscriber at all; `tracing` calls are simply dropped. Used
/// when no telemetry sink is configured.
pub fn init_noop() -> anyhow::Result<TelemetryGuard> {
    Ok(TelemetryGuard {
        #[cfg(feature = "otel")]
        otel_providers: None,
    })
}

/// Install a JSON-to-stderr subscriber, env-filter controlled by `RUST_LOG`.
pub fn init_stderr() -> anyhow::Result<TelemetryGuard> {
    use tracing_subscriber::prelude::*;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().json().with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install stderr telemetry subscriber: {e}"))?;

    Ok(TelemetryGuard {
        #[cfg(feature = "otel")]
        otel_providers: None,
    })
}

#[cfg(feature = "otel")]
fn init_otlp(endpoint: &str) -> anyhow::Result<TelemetryGuard> {
    use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
    use tracing_subscriber::prelude::*;

    let tracer_provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().http().with_endpoint(endpoint))
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    let logger_provider = opentelemetry_sdk::logs::SdkLoggerProvider::builder().build();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer_provider.clone());
    let log_bridge = OpenTelemetryTracingBridge::new(&logger_provider);

    tracing_subscriber::registry()
        .with(filter)
        .with(otel_layer)
        .with(log_bridge)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install OTLP telemetry subscriber: {e}"))?;

    Ok(TelemetryGuard {
        otel_providers: Some(OtelProviders { tracer_provider, logger_provider }),
    })
}

#[cfg(not(feature = "otel"))]
fn init_otlp(_endpoint: &str) -> anyhow::Result<TelemetryGuard> {
    anyhow::bail!("OTLP telemetry requested but conduit was built without the `otel` feature")
}

/// Read the `session-id` environment variable, if set, for forwarding onto
/// telemetry as `session.id`.
#[must_use]
pub fn session_id_from_env() -> Option<String> {
    env_session_id(env::var("session-id").ok())
}

fn env_session_id(raw: Option<String>) -> Option<String> {
    raw.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_session_id_passes_through_nonempty_value() {
        assert_eq!(env_session_id(Some("abc123".to_owned())), Some("abc123".to_owned()));
    }

    #[test]
    fn env_session_id_treats_empty_string_as_unset() {
        assert_eq!(env_session_id(Some(String::new())), None);
    }

    #[test]
    fn env_session_id_passes_through_none() {
        assert_eq!(env_session_id(None), None);
    }
}
