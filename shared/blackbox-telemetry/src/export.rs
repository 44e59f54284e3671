//! Metric export pipeline
//!
//! An OpenTelemetry `MeterProvider` driven by the SDK `PeriodicReader`.
//! Collected gauge points are converted to [`MetricPoint`]s and handed to a
//! [`MetricsExporter`] such as Cloud Monitoring or the log exporter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::data::{self, Aggregation as _, ResourceMetrics, Temporality};
use opentelemetry_sdk::metrics::exporter::PushMetricsExporter;
use opentelemetry_sdk::metrics::reader::{
    AggregationSelector, DefaultAggregationSelector, DefaultTemporalitySelector,
    TemporalitySelector,
};
use opentelemetry_sdk::metrics::{Aggregation, InstrumentKind, MeterProvider, PeriodicReader};
use opentelemetry_sdk::{runtime, Resource};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::metrics::{MetricPoint, MetricsError};

/// Destination for collected gauge points
#[async_trait]
pub trait MetricsExporter: Send + Sync {
    async fn export(&self, points: &[MetricPoint]) -> Result<(), MetricsError>;
}

/// Writes each point as a tracing event. Used when no monitoring project is configured.
#[derive(Debug, Clone, Default)]
pub struct LogExporter;

#[async_trait]
impl MetricsExporter for LogExporter {
    async fn export(&self, points: &[MetricPoint]) -> Result<(), MetricsError> {
        for point in points {
            info!(
                target: "blackbox::metrics",
                metric = %point.name,
                labels = ?point.labels,
                value = point.value,
                unit = %point.unit,
                time = %point.time.to_rfc3339(),
                "metric"
            );
        }
        Ok(())
    }
}

type LastExport = Arc<Mutex<Option<MetricsError>>>;

/// Hands SDK collections to a [`MetricsExporter`]
struct PushExporter {
    exporter: Arc<dyn MetricsExporter>,
    last_export: LastExport,
}

impl AggregationSelector for PushExporter {
    fn aggregation(&self, kind: InstrumentKind) -> Aggregation {
        DefaultAggregationSelector::new().aggregation(kind)
    }
}

impl TemporalitySelector for PushExporter {
    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        DefaultTemporalitySelector::new().temporality(kind)
    }
}

#[async_trait]
impl PushMetricsExporter for PushExporter {
    async fn export(&self, metrics: &mut ResourceMetrics) -> opentelemetry::metrics::Result<()> {
        let points = gauge_points(metrics);
        if points.is_empty() {
            *self.last_export.lock() = None;
            return Ok(());
        }

        // The reader drops export results, so failures are kept for flush().
        match self.exporter.export(&points).await {
            Ok(()) => {
                debug!(points = points.len(), "Exported metrics");
                *self.last_export.lock() = None;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, points = points.len(), "Metric export failed");
                let message = e.to_string();
                *self.last_export.lock() = Some(e);
                Err(opentelemetry::metrics::MetricsError::Other(message))
            }
        }
    }

    async fn force_flush(&self) -> opentelemetry::metrics::Result<()> {
        Ok(())
    }

    fn shutdown(&self) -> opentelemetry::metrics::Result<()> {
        Ok(())
    }
}

/// Flatten every `f64` gauge in a collection, ordered by name then labels
fn gauge_points(metrics: &ResourceMetrics) -> Vec<MetricPoint> {
    let mut points = Vec::new();

    for scope in &metrics.scope_metrics {
        for metric in &scope.metrics {
            let Some(gauge) = metric.data.as_any().downcast_ref::<data::Gauge<f64>>() else {
                continue;
            };

            for point in &gauge.data_points {
                points.push(MetricPoint {
                    name: metric.name.to_string(),
                    description: metric.description.to_string(),
                    unit: metric.unit.as_str().to_string(),
                    labels: point
                        .attributes
                        .iter()
                        .map(|(k, v)| (k.as_str().to_string(), v.as_str().into_owned()))
                        .collect(),
                    value: point.value,
                    time: point.time.map(DateTime::<Utc>::from).unwrap_or_else(Utc::now),
                });
            }
        }
    }

    points.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.labels.cmp(&b.labels)));
    points
}

/// Meter provider with a periodic push reader
pub struct MeterPipeline {
    provider: MeterProvider,
    meter: Meter,
    interval: Duration,
    last_export: LastExport,
}

impl MeterPipeline {
    /// Build the provider and start the reader. Must be called from within a
    /// tokio runtime.
    pub fn start(
        service_name: &str,
        exporter: Arc<dyn MetricsExporter>,
        interval: Duration,
    ) -> Result<Self, MetricsError> {
        // The SDK silently replaces a zero interval with its default.
        if interval.is_zero() {
            return Err(MetricsError::Unavailable(
                "reporting interval must be non-zero".to_string(),
            ));
        }
        tokio::runtime::Handle::try_current()
            .map_err(|e| MetricsError::Unavailable(e.to_string()))?;

        let last_export = LastExport::default();
        let reader = PeriodicReader::builder(
            PushExporter {
                exporter,
                last_export: last_export.clone(),
            },
            runtime::Tokio,
        )
        .with_interval(interval)
        .build();

        let provider = MeterProvider::builder()
            .with_resource(Resource::new([KeyValue::new(
                "service.name",
                service_name.to_string(),
            )]))
            .with_reader(reader)
            .build();
        let meter = provider.meter(service_name.to_string());

        info!(interval_secs = interval.as_secs(), "Metric exporter started");
        Ok(Self {
            provider,
            meter,
            interval,
            last_export,
        })
    }

    pub fn meter(&self) -> &Meter {
        &self.meter
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Collect and export immediately.
    pub async fn flush(&self) -> Result<(), MetricsError> {
        let provider = self.provider.clone();
        self.blocking(move || provider.force_flush()).await
    }

    /// Export one last time and stop the reader.
    pub async fn shutdown(&self) -> Result<(), MetricsError> {
        let provider = self.provider.clone();
        self.blocking(move || provider.shutdown()).await
    }

    // Provider flush and shutdown block on the reader task, which runs on
    // this runtime.
    async fn blocking<F>(&self, call: F) -> Result<(), MetricsError>
    where
        F: FnOnce() -> opentelemetry::metrics::Result<()> + Send + 'static,
    {
        tokio::task::spawn_blocking(call)
            .await
            .map_err(|e| MetricsError::Unavailable(e.to_string()))?
            .map_err(|e| MetricsError::Unavailable(e.to_string()))?;

        match self.last_export.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{LastValueGauges, Measure, Tag, View};

    #[derive(Default)]
    struct RecordingExporter {
        batches: Mutex<Vec<Vec<MetricPoint>>>,
    }

    #[async_trait]
    impl MetricsExporter for RecordingExporter {
        async fn export(&self, points: &[MetricPoint]) -> Result<(), MetricsError> {
            self.batches.lock().push(points.to_vec());
            Ok(())
        }
    }

    struct FailingExporter;

    #[async_trait]
    impl MetricsExporter for FailingExporter {
        async fn export(&self, _points: &[MetricPoint]) -> Result<(), MetricsError> {
            Err(MetricsError::Export("quota exceeded".to_string()))
        }
    }

    fn humidity() -> Measure {
        Measure::float64("blackbox/m/humidity/last", "The humidity", "rh")
    }

    fn gauges_with_reading(pipeline: &MeterPipeline) -> LastValueGauges {
        let gauges = LastValueGauges::new(pipeline.meter().clone());
        gauges
            .register(&[View {
                name: "blackbox/humidity/last".to_string(),
                description: "The distribution of the humidity".to_string(),
                measure: humidity(),
                tag_keys: vec!["device".to_string()],
            }])
            .unwrap();
        gauges.record(&[Tag::new("device", "kitchen").unwrap()], &[humidity().m(40.0)]);
        gauges
    }

    #[tokio::test]
    async fn test_flush_exports_last_value() {
        let exporter = Arc::new(RecordingExporter::default());
        let pipeline =
            MeterPipeline::start("blackbox-test", exporter.clone(), Duration::from_secs(60)).unwrap();
        let _gauges = gauges_with_reading(&pipeline);

        pipeline.flush().await.unwrap();

        let batches = exporter.batches.lock();
        let last = batches.last().expect("one export");
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].name, "blackbox/humidity/last");
        assert_eq!(last[0].unit, "rh");
        assert_eq!(last[0].value, 40.0);
        assert_eq!(last[0].labels.get("device").map(String::as_str), Some("kitchen"));
    }

    #[tokio::test]
    async fn test_each_export_is_stamped_at_collection() {
        let exporter = Arc::new(RecordingExporter::default());
        let pipeline =
            MeterPipeline::start("blackbox-test", exporter.clone(), Duration::from_secs(60)).unwrap();
        let _gauges = gauges_with_reading(&pipeline);

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            pipeline.flush().await.unwrap();
        }

        let batches = exporter.batches.lock();
        assert!(batches.len() >= 3);
        let times: Vec<DateTime<Utc>> = batches.iter().map(|batch| batch[0].time).collect();
        assert!(times.windows(2).all(|pair| pair[0] < pair[1]), "{:?}", times);
        assert!(batches.iter().all(|batch| batch[0].value == 40.0));
    }

    #[tokio::test]
    async fn test_flush_skips_empty_collection() {
        let exporter = Arc::new(RecordingExporter::default());
        let pipeline =
            MeterPipeline::start("blackbox-test", exporter.clone(), Duration::from_secs(60)).unwrap();

        pipeline.flush().await.unwrap();
        assert!(exporter.batches.lock().is_empty());
    }

    #[tokio::test]
    async fn test_export_failure_surfaces_on_flush() {
        let pipeline =
            MeterPipeline::start("blackbox-test", Arc::new(FailingExporter), Duration::from_secs(60))
                .unwrap();
        let _gauges = gauges_with_reading(&pipeline);

        assert!(matches!(pipeline.flush().await, Err(MetricsError::Export(_))));
    }

    #[tokio::test]
    async fn test_reader_exports_on_interval() {
        let exporter = Arc::new(RecordingExporter::default());
        let pipeline =
            MeterPipeline::start("blackbox-test", exporter.clone(), Duration::from_millis(20)).unwrap();
        let _gauges = gauges_with_reading(&pipeline);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!exporter.batches.lock().is_empty());

        pipeline.shutdown().await.unwrap();
        assert!(pipeline.shutdown().await.is_err());
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        assert!(matches!(
            MeterPipeline::start("blackbox-test", Arc::new(LogExporter), Duration::ZERO),
            Err(MetricsError::Unavailable(_))
        ));
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        assert!(matches!(
            MeterPipeline::start("blackbox-test", Arc::new(LogExporter), Duration::from_secs(60)),
            Err(MetricsError::Unavailable(_))
        ));
    }
}
