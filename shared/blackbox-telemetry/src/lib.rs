//! Blackbox Telemetry
//!
//! Process observability (tracing, optional OTLP span export) and the
//! OpenTelemetry last-value gauges that sensor readings are recorded into.

mod config;
mod tracing_setup;
mod metrics;
mod export;

pub use config::TelemetryConfig;
pub use tracing_setup::init_tracing;
pub use metrics::{
    Counter, LastValueGauges, Measure, Measurement, MetricPoint, MetricsError, Tag, View,
    MAX_TAG_VALUE_LEN,
};
pub use export::{LogExporter, MeterPipeline, MetricsExporter};

/// Initialize process telemetry from the environment. Keep the guard alive
/// for the lifetime of `main`.
pub fn init(service_name: &str) -> Result<TelemetryGuard, TelemetryError> {
    init_with(service_name, &TelemetryConfig::from_env())
}

pub fn init_with(service_name: &str, config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    init_tracing(service_name, config)?;
    Ok(TelemetryGuard {
        exports_spans: config.otlp_endpoint.is_some(),
    })
}

/// Flushes pending spans on drop
pub struct TelemetryGuard {
    exports_spans: bool,
}

impl TelemetryGuard {
    pub fn exports_spans(&self) -> bool {
        self.exports_spans
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.exports_spans {
            opentelemetry::global::shutdown_tracer_provider();
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Tracing initialization failed: {0}")]
    TracingInit(String),

    #[error("OTLP configuration error: {0}")]
    OtlpConfig(String),
}
