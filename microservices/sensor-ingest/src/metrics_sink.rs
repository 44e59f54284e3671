//! Metrics sink
//!
//! Registers the four last-value sensor gauges once per process and records
//! each reading into them, tagged by device. Export to the monitoring
//! backend happens out of band on a fixed interval.

use async_trait::async_trait;
use blackbox_core::InvocationContext;
use blackbox_telemetry::{
    LastValueGauges, Measure, Measurement, MeterPipeline, MetricsError, MetricsExporter, Tag, View,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::SinkError;
use crate::reading::SensorReading;

/// How often gauge values are pushed to the backend
pub const REPORTING_INTERVAL: Duration = Duration::from_secs(60);

pub const DEVICE_KEY: &str = "device";

/// Tagged-measurement capability of a metrics backend
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    async fn register(&self, views: &[View]) -> Result<(), MetricsError>;
    async fn start_exporter(&self, interval: Duration) -> Result<(), MetricsError>;
    async fn record(&self, tags: &[Tag], measurements: &[Measurement]) -> Result<(), MetricsError>;
    /// Export once more and stop exporting
    async fn shutdown(&self) -> Result<(), MetricsError>;
}

#[derive(Debug, Clone)]
pub struct SensorMeasures {
    pub temperature: Measure,
    pub humidity: Measure,
    pub pressure: Measure,
    pub air_quality: Measure,
}

impl Default for SensorMeasures {
    fn default() -> Self {
        Self {
            temperature: Measure::float64(
                "blackbox/m/temperature/last",
                "The temperature in celsius",
                "c",
            ),
            humidity: Measure::float64(
                "blackbox/m/humidity/last",
                "The humidity in relative humidity",
                "rh",
            ),
            pressure: Measure::float64("blackbox/m/pressure/last", "The pressure in hPa", "hPa"),
            air_quality: Measure::float64(
                "blackbox/m/air_quality/last",
                "The indoor air quality using IAQ index",
                "iaq",
            ),
        }
    }
}

impl SensorMeasures {
    pub fn views(&self) -> Vec<View> {
        let view = |name: &str, description: &str, measure: &Measure| View {
            name: name.to_string(),
            description: description.to_string(),
            measure: measure.clone(),
            tag_keys: vec![DEVICE_KEY.to_string()],
        };

        vec![
            view(
                "blackbox/temperature/last",
                "The distribution of the temperatures",
                &self.temperature,
            ),
            view(
                "blackbox/humidity/last",
                "The distribution of the humidity",
                &self.humidity,
            ),
            view(
                "blackbox/pressure/last",
                "The distribution of the pressure",
                &self.pressure,
            ),
            view(
                "blackbox/air_quality/last",
                "The distribution of the air quality",
                &self.air_quality,
            ),
        ]
    }

    pub fn measurements(&self, reading: &SensorReading) -> [Measurement; 4] {
        [
            self.temperature.m(reading.temperature),
            self.humidity.m(reading.humidity),
            self.pressure.m(reading.pressure),
            self.air_quality.m(reading.air_quality),
        ]
    }
}

/// OpenTelemetry gauges exported periodically through a [`MetricsExporter`]
pub struct RegistryBackend {
    exporter: Arc<dyn MetricsExporter>,
    installed: Mutex<Option<Arc<Installed>>>,
}

struct Installed {
    pipeline: MeterPipeline,
    gauges: LastValueGauges,
}

impl RegistryBackend {
    pub fn new(exporter: Arc<dyn MetricsExporter>) -> Self {
        Self {
            exporter,
            installed: Mutex::new(None),
        }
    }

    /// Number of gauges registered so far
    pub fn gauges(&self) -> usize {
        self.installed().map(|i| i.gauges.len()).unwrap_or(0)
    }

    fn installed(&self) -> Option<Arc<Installed>> {
        self.installed.lock().clone()
    }
}

#[async_trait]
impl MetricsBackend for RegistryBackend {
    async fn register(&self, views: &[View]) -> Result<(), MetricsError> {
        let installed = self.installed().ok_or_else(|| {
            MetricsError::Unavailable("exporter must be started before registration".to_string())
        })?;
        installed.gauges.register(views)
    }

    async fn start_exporter(&self, interval: Duration) -> Result<(), MetricsError> {
        let mut slot = self.installed.lock();
        if slot.is_some() {
            return Ok(());
        }

        let pipeline = MeterPipeline::start(crate::SERVICE_NAME, self.exporter.clone(), interval)?;
        let gauges = LastValueGauges::new(pipeline.meter().clone());
        *slot = Some(Arc::new(Installed { pipeline, gauges }));
        Ok(())
    }

    async fn record(&self, tags: &[Tag], measurements: &[Measurement]) -> Result<(), MetricsError> {
        if let Some(installed) = self.installed() {
            installed.gauges.record(tags, measurements);
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), MetricsError> {
        match self.installed() {
            Some(installed) => installed.pipeline.shutdown().await,
            None => Ok(()),
        }
    }
}

/// Process-wide metric registration plus per-reading recording
pub struct MetricsSink {
    backend: Arc<dyn MetricsBackend>,
    measures: SensorMeasures,
    interval: Duration,
    registered: tokio::sync::Mutex<bool>,
}

impl MetricsSink {
    pub fn new(backend: Arc<dyn MetricsBackend>) -> Self {
        Self::with_interval(backend, REPORTING_INTERVAL)
    }

    pub fn with_interval(backend: Arc<dyn MetricsBackend>, interval: Duration) -> Self {
        Self {
            backend,
            measures: SensorMeasures::default(),
            interval,
            registered: tokio::sync::Mutex::new(false),
        }
    }

    pub fn measures(&self) -> &SensorMeasures {
        &self.measures
    }

    pub async fn is_registered(&self) -> bool {
        *self.registered.lock().await
    }

    /// Start the exporter and register the views on it. Only the first
    /// successful call reaches the backend; the lock is held across
    /// registration so concurrent first invocations wait for it.
    pub async fn ensure_registered(&self, ctx: &InvocationContext) -> Result<(), SinkError> {
        let mut registered = self.registered.lock().await;
        if *registered {
            return Ok(());
        }

        let views = self.measures.views();
        ctx.run(async {
            self.backend.start_exporter(self.interval).await?;
            self.backend.register(&views).await
        })
        .await
        .map_err(SinkError::metrics)?
        .map_err(SinkError::metrics)?;

        *registered = true;
        info!(
            views = views.len(),
            interval_secs = self.interval.as_secs(),
            "Registered sensor metric views"
        );
        Ok(())
    }

    /// Record one value per measure, tagged with the reading's device.
    pub async fn record(&self, reading: &SensorReading, ctx: &InvocationContext) -> Result<(), SinkError> {
        let tag = Tag::new(DEVICE_KEY, reading.device.as_str()).map_err(SinkError::metrics)?;
        let measurements = self.measures.measurements(reading);

        ctx.run(self.backend.record(std::slice::from_ref(&tag), &measurements))
            .await
            .map_err(SinkError::metrics)?
            .map_err(SinkError::metrics)?;

        debug!(device = %reading.device, "Recorded sensor metrics");
        Ok(())
    }

    /// Best-effort final export at process exit.
    pub async fn shutdown(&self) -> Result<(), SinkError> {
        self.backend.shutdown().await.map_err(SinkError::metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blackbox_telemetry::MetricPoint;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingBackend {
        registrations: AtomicUsize,
        exporter_starts: AtomicUsize,
        records: Mutex<Vec<(Vec<Tag>, Vec<Measurement>)>>,
    }

    #[async_trait]
    impl MetricsBackend for CountingBackend {
        async fn register(&self, _views: &[View]) -> Result<(), MetricsError> {
            self.registrations.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(())
        }

        async fn start_exporter(&self, _interval: Duration) -> Result<(), MetricsError> {
            self.exporter_starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn record(&self, tags: &[Tag], measurements: &[Measurement]) -> Result<(), MetricsError> {
            self.records.lock().push((tags.to_vec(), measurements.to_vec()));
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), MetricsError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CapturingExporter {
        points: Mutex<Vec<MetricPoint>>,
    }

    #[async_trait]
    impl MetricsExporter for CapturingExporter {
        async fn export(&self, points: &[MetricPoint]) -> Result<(), MetricsError> {
            self.points.lock().extend_from_slice(points);
            Ok(())
        }
    }

    fn reading(device: &str) -> SensorReading {
        SensorReading {
            timestamp: crate::reading::DisplayTimestamp::new("03/05/2024 2:07 PM".to_string()),
            device: device.to_string(),
            temperature: 21.5,
            humidity: 40.0,
            pressure: 1013.2,
            air_quality: 12.0,
        }
    }

    #[tokio::test]
    async fn test_ensure_registered_twice_registers_once() {
        let backend = Arc::new(CountingBackend::default());
        let sink = MetricsSink::new(backend.clone());
        let ctx = InvocationContext::new();

        sink.ensure_registered(&ctx).await.unwrap();
        sink.ensure_registered(&ctx).await.unwrap();

        assert_eq!(backend.registrations.load(Ordering::SeqCst), 1);
        assert_eq!(backend.exporter_starts.load(Ordering::SeqCst), 1);
        assert!(sink.is_registered().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_registers_once() {
        let backend = Arc::new(CountingBackend::default());
        let sink = Arc::new(MetricsSink::new(backend.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let sink = sink.clone();
                tokio::spawn(async move { sink.ensure_registered(&InvocationContext::new()).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(backend.registrations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_record_tags_device() {
        let backend = Arc::new(CountingBackend::default());
        let sink = MetricsSink::new(backend.clone());

        sink.record(&reading("kitchen"), &InvocationContext::new()).await.unwrap();

        let records = backend.records.lock();
        assert_eq!(records.len(), 1);
        let (tags, measurements) = &records[0];
        assert_eq!(tags[0].key(), "device");
        assert_eq!(tags[0].value(), "kitchen");
        let values: Vec<f64> = measurements.iter().map(|m| m.value).collect();
        assert_eq!(values, vec![21.5, 40.0, 1013.2, 12.0]);
    }

    #[tokio::test]
    async fn test_invalid_device_tag_is_surfaced() {
        let backend = Arc::new(CountingBackend::default());
        let sink = MetricsSink::new(backend.clone());

        let err = sink
            .record(&reading("k\u{fc}che"), &InvocationContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.sink, crate::error::SinkKind::Metrics);
        assert!(backend.records.lock().is_empty());
    }

    #[tokio::test]
    async fn test_registry_backend_exports_last_values_on_shutdown() {
        let exporter = Arc::new(CapturingExporter::default());
        let backend = Arc::new(RegistryBackend::new(exporter.clone()));
        let sink = MetricsSink::new(backend.clone());
        let ctx = InvocationContext::new();

        sink.ensure_registered(&ctx).await.unwrap();
        assert_eq!(backend.gauges(), 4);

        sink.record(&reading("kitchen"), &ctx).await.unwrap();
        sink.shutdown().await.unwrap();

        let points = exporter.points.lock();
        assert_eq!(points.len(), 4);
        let temperature = points
            .iter()
            .find(|p| p.name == "blackbox/temperature/last")
            .expect("temperature point");
        assert_eq!(temperature.value, 21.5);
        assert_eq!(temperature.unit, "c");
        assert_eq!(temperature.labels.get("device").map(String::as_str), Some("kitchen"));
    }

    #[tokio::test]
    async fn test_registry_backend_requires_started_exporter() {
        let backend = RegistryBackend::new(Arc::new(CapturingExporter::default()));
        let views = SensorMeasures::default().views();

        assert!(matches!(
            backend.register(&views).await,
            Err(MetricsError::Unavailable(_))
        ));
        assert_eq!(backend.gauges(), 0);
        assert!(backend.shutdown().await.is_ok());
    }
}
