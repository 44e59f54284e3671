//! Sensor Ingest Microservice
//!
//! Bus push endpoint for device sensor events:
//! - last-value metric gauges exported to Cloud Monitoring
//! - one sheet row per reading
//! - structured invocation log lines

use blackbox_core::{MicroserviceRuntime, TracingEventLogger};
use blackbox_gcp::{token_source_from_env, CloudMonitoringExporter, SheetsClient};
use blackbox_telemetry::{LogExporter, MetricsExporter};
use sensor_ingest::{IngestConfig, IngestService, LogSink, MetricsSink, RegistryBackend};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _telemetry = blackbox_telemetry::init(sensor_ingest::SERVICE_NAME)?;

    info!("Starting Sensor Ingest");

    // Load configuration
    let config = IngestConfig::from_env()?;

    let client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;
    let tokens = token_source_from_env(client.clone())?;

    // Sheet log
    let sheets = SheetsClient::new(client.clone(), tokens.clone()).with_range(&config.sheet_range);
    let log = Arc::new(LogSink::new(&config.sheet_id, Arc::new(sheets))?);

    // Metric export
    let exporter: Arc<dyn MetricsExporter> = match &config.project_id {
        Some(project_id) => {
            info!(project_id = %project_id, "Exporting metrics to Cloud Monitoring");
            Arc::new(CloudMonitoringExporter::new(client, project_id, tokens)?)
        }
        None => {
            info!("GOOGLE_CLOUD_PROJECT not set, metrics are written to the log");
            Arc::new(LogExporter)
        }
    };
    let metrics = Arc::new(MetricsSink::with_interval(
        Arc::new(RegistryBackend::new(exporter)),
        config.reporting_interval,
    ));

    let service = IngestService::new(config, metrics, log, Arc::new(TracingEventLogger));
    MicroserviceRuntime::run(Arc::new(service)).await?;

    Ok(())
}
