// Logging, span export and Prometheus metrics for the launcher

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::models::{ExecutionStatus, SourceKind};

const SERVICE_NAME: &str = "batch-trigger-launcher";

/// Initialize structured JSON logging.
///
/// `RUST_LOG` takes precedence over `log_level`. When `tracing_endpoint` is
/// set, spans are also exported over OTLP.
pub fn init_logging(log_level: &str, tracing_endpoint: Option<&str>) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level)
            .map_err(|e| anyhow::anyhow!("Invalid log level '{}': {}", log_level, e))?,
    };

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_target(true)
        .with_filter(env_filter);

    // None leaves the subscriber without span export
    let otlp_layer = match tracing_endpoint {
        Some(endpoint) => Some(tracing_opentelemetry::layer().with_tracer(init_tracer(endpoint)?)),
        None => None,
    };

    tracing_subscriber::registry()
        .with(json_layer)
        .with(otlp_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Tracing subscriber already installed: {}", e))?;

    tracing::info!(log_level, otlp = tracing_endpoint.is_some(), "Logging initialized");
    Ok(())
}

fn init_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_sdk::runtime::Tokio;

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to build span exporter: {}", e))?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    global::set_tracer_provider(tracer_provider.clone());

    Ok(tracer_provider.tracer(SERVICE_NAME))
}

/// Flush remaining spans; call once on shutdown
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

/// Install the Prometheus exporter and describe the launcher's metrics
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        "batch_job_completed_total",
        "Total number of job executions that completed"
    );
    describe_counter!(
        "batch_job_failed_total",
        "Total number of job executions that failed"
    );
    describe_histogram!(
        "batch_job_duration_seconds",
        "Wall-clock duration of job executions in seconds"
    );
    describe_counter!(
        "batch_trigger_events_total",
        "Trigger events emitted by trigger sources"
    );
    describe_counter!(
        "batch_trigger_dead_letters_total",
        "Claimed records that could not be parsed"
    );

    tracing::info!(metrics_port = metrics_port, "Prometheus metrics exporter initialized");

    Ok(())
}

/// Record a terminal job execution
pub fn record_job_outcome(job_name: &str, status: ExecutionStatus, duration_ms: i64) {
    match status {
        ExecutionStatus::Completed => {
            counter!("batch_job_completed_total", "job_name" => job_name.to_string()).increment(1)
        }
        ExecutionStatus::Failed => {
            counter!("batch_job_failed_total", "job_name" => job_name.to_string()).increment(1)
        }
        ExecutionStatus::Running => return,
    }
    histogram!("batch_job_duration_seconds", "job_name" => job_name.to_string())
        .record(duration_ms as f64 / 1000.0);
}

#[inline]
pub fn record_trigger_events(source: SourceKind, count: usize) {
    counter!("batch_trigger_events_total", "source" => source.to_string()).increment(count as u64);
}

#[inline]
pub fn record_dead_letter(source: SourceKind) {
    counter!("batch_trigger_dead_letters_total", "source" => source.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent_enough() {
        // A second initialization in the same process reports an error instead of panicking
        let first = init_logging("info", None);
        let second = init_logging("debug", None);
        assert!(first.is_ok() || second.is_err());
    }

    #[test]
    fn test_metrics_recording_without_exporter() {
        record_job_outcome("exampleJob", ExecutionStatus::Completed, 1500);
        record_job_outcome("exampleJob", ExecutionStatus::Failed, 20);
        record_job_outcome("exampleJob", ExecutionStatus::Running, 0);
        record_trigger_events(SourceKind::File, 3);
        record_dead_letter(SourceKind::Record);
    }
}
