//! Tracing setup for the server.
//!
//! Always logs to stdout. When an OTLP endpoint is configured, traces, logs
//! and metrics are also exported over gRPC.

use std::time::Duration;

use anyhow::{Context, Result};
use emoconf::TelemetryConfig;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler};
use opentelemetry_sdk::Resource;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Timeout for OTLP exports - prevents blocking on unavailable endpoints
const EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_FILTER: &str = "info,emowrap=debug,cortex_session=debug";

fn env_filter(level: &str) -> EnvFilter {
    if level.trim().is_empty() {
        return EnvFilter::new(DEFAULT_FILTER);
    }
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn otlp_url(endpoint: &str) -> String {
    if endpoint.starts_with("http") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    }
}

/// Initialize the global subscriber for `emowrap serve`.
pub fn init(config: &TelemetryConfig) -> Result<()> {
    if !config.otlp_enabled() {
        tracing_subscriber::registry()
            .with(env_filter(&config.log_level))
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .context("Failed to install tracing subscriber")?;
        return Ok(());
    }

    let resource = Resource::builder_empty()
        .with_service_name("emowrap")
        .with_attributes(vec![KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        )])
        .build();

    let endpoint = otlp_url(&config.otlp_endpoint);

    let trace_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .context("Failed to create OTLP span exporter")?;

    let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_span_processor(
            opentelemetry_sdk::trace::BatchSpanProcessor::builder(trace_exporter).build(),
        )
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource.clone())
        .build();

    let tracer = tracer_provider.tracer("emowrap");
    global::set_tracer_provider(tracer_provider);

    let log_exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .context("Failed to create OTLP log exporter")?;

    let logger_provider = opentelemetry_sdk::logs::SdkLoggerProvider::builder()
        .with_log_processor(
            opentelemetry_sdk::logs::BatchLogProcessor::builder(log_exporter).build(),
        )
        .with_resource(resource.clone())
        .build();

    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .context("Failed to create OTLP metric exporter")?;

    let meter_provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
        .with_reader(opentelemetry_sdk::metrics::PeriodicReader::builder(metric_exporter).build())
        .with_resource(resource)
        .build();

    global::set_meter_provider(meter_provider);

    let log_appender =
        opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(&logger_provider);

    tracing_subscriber::registry()
        .with(env_filter(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(log_appender)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(endpoint = %config.otlp_endpoint, "OpenTelemetry export enabled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_endpoints_get_a_scheme() {
        assert_eq!(otlp_url("localhost:4317"), "http://localhost:4317");
        assert_eq!(otlp_url("https://otel.lab:4317"), "https://otel.lab:4317");
    }

    #[test]
    fn filter_falls_back_on_empty_level() {
        use tracing_subscriber::filter::LevelFilter;

        assert_eq!(env_filter("").max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(env_filter("warn").max_level_hint(), Some(LevelFilter::WARN));
    }
}
