//! Cloud Monitoring exporter for last-value gauges

use async_trait::async_trait;
use blackbox_telemetry::{MetricPoint, MetricsError, MetricsExporter};
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::auth::TokenSource;
use crate::error::{GcpError, Result};

pub const DEFAULT_MONITORING_URL: &str = "https://monitoring.googleapis.com/v3";
pub const DEFAULT_METRIC_PREFIX: &str = "custom.googleapis.com/opencensus/";

/// Per-request series limit of `projects.timeSeries.create`.
pub const MAX_SERIES_PER_REQUEST: usize = 200;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateTimeSeriesRequest {
    pub time_series: Vec<TimeSeries>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TimeSeries {
    pub metric: Metric,
    pub resource: MonitoredResource,
    pub metric_kind: &'static str,
    pub value_type: &'static str,
    pub points: Vec<Point>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Metric {
    #[serde(rename = "type")]
    pub metric_type: String,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MonitoredResource {
    #[serde(rename = "type")]
    pub resource_type: &'static str,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Point {
    pub interval: Interval,
    pub value: TypedValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Interval {
    pub end_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TypedValue {
    pub double_value: f64,
}

pub struct CloudMonitoringExporter {
    client: Client,
    base_url: String,
    project_id: String,
    metric_prefix: String,
    tokens: Arc<dyn TokenSource>,
}

impl CloudMonitoringExporter {
    pub fn new(client: Client, project_id: &str, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        if project_id.trim().is_empty() {
            return Err(GcpError::Config("monitoring project id is empty".to_string()));
        }
        Ok(Self {
            client,
            base_url: DEFAULT_MONITORING_URL.to_string(),
            project_id: project_id.to_string(),
            metric_prefix: DEFAULT_METRIC_PREFIX.to_string(),
            tokens,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn create_url(&self) -> String {
        format!("{}/projects/{}/timeSeries", self.base_url, self.project_id)
    }

    pub(crate) fn to_time_series(&self, point: &MetricPoint) -> TimeSeries {
        let mut resource_labels = BTreeMap::new();
        resource_labels.insert("project_id".to_string(), self.project_id.clone());

        TimeSeries {
            metric: Metric {
                metric_type: format!("{}{}", self.metric_prefix, point.name),
                labels: point.labels.clone(),
            },
            resource: MonitoredResource {
                resource_type: "global",
                labels: resource_labels,
            },
            metric_kind: "GAUGE",
            value_type: "DOUBLE",
            points: vec![Point {
                interval: Interval {
                    end_time: point
                        .time
                        .to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
                },
                value: TypedValue {
                    double_value: point.value,
                },
            }],
        }
    }

    pub(crate) fn build_requests(&self, points: &[MetricPoint]) -> Vec<CreateTimeSeriesRequest> {
        points
            .chunks(MAX_SERIES_PER_REQUEST)
            .map(|chunk| CreateTimeSeriesRequest {
                time_series: chunk.iter().map(|point| self.to_time_series(point)).collect(),
            })
            .collect()
    }

    async fn send(&self, request: &CreateTimeSeriesRequest) -> Result<()> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(self.create_url())
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(GcpError::from_response(response).await)
        }
    }
}

#[async_trait]
impl MetricsExporter for CloudMonitoringExporter {
    async fn export(&self, points: &[MetricPoint]) -> std::result::Result<(), MetricsError> {
        for request in self.build_requests(points) {
            self.send(&request)
                .await
                .map_err(|e| MetricsError::Export(e.to_string()))?;
            debug!(
                project = %self.project_id,
                series = request.time_series.len(),
                "Wrote time series"
            );
        }
        Ok(())
    }
}
