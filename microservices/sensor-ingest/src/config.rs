//! Configuration for Sensor Ingest

use blackbox_core::config::{env_or, parse_env, required_env};
use blackbox_core::ServiceConfig;
use std::time::Duration;

use crate::error::ConfigError;
use crate::metrics_sink::REPORTING_INTERVAL;

/// Sensor ingest configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// HTTP surface and service identity
    pub service: ServiceConfig,
    /// Target spreadsheet for the reading log
    pub sheet_id: String,
    /// A1 range the append starts searching from
    pub sheet_range: String,
    /// Cloud Monitoring project; metrics are only logged when unset
    pub project_id: Option<String>,
    /// Metric export interval
    pub reporting_interval: Duration,
    /// Deadline applied to each invocation's sink calls
    pub invocation_timeout: Duration,
    /// Per-request timeout of the outbound HTTP client
    pub http_timeout: Duration,
}

impl IngestConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            service: ServiceConfig::from_env("sensor-ingest")?,
            sheet_id: required_env("SHEET_ID")?,
            sheet_range: env_or("SHEET_RANGE", blackbox_gcp::sheets::DEFAULT_RANGE),
            project_id: std::env::var("GOOGLE_CLOUD_PROJECT")
                .ok()
                .filter(|p| !p.trim().is_empty()),
            reporting_interval: Duration::from_secs(parse_env(
                "METRICS_REPORTING_INTERVAL_SECS",
                REPORTING_INTERVAL.as_secs(),
            )?),
            invocation_timeout: Duration::from_secs(parse_env("INVOCATION_TIMEOUT_SECS", 60)?),
            http_timeout: Duration::from_secs(parse_env("HTTP_TIMEOUT_SECS", 30)?),
        })
    }
}
