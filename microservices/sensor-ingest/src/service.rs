//! Sensor ingest service wiring

use async_trait::async_trait;
use blackbox_core::{
    BlackboxError, BlackboxService, DependencyStatus, EventLogger, HealthStatus,
    InvocationContext, PushEnvelope, RawEvent, ReadinessStatus, Result,
};
use blackbox_telemetry::Counter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::api;
use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::log_sink::LogSink;
use crate::metrics_sink::MetricsSink;
use crate::pipeline::IngestionPipeline;
use crate::reading::SensorReading;

/// Invocation counters surfaced on `/health`
#[derive(Clone)]
pub struct IngestStats {
    pub received: Counter,
    pub succeeded: Counter,
    pub failed: Counter,
    pub rejected: Counter,
}

impl Default for IngestStats {
    fn default() -> Self {
        Self {
            received: Counter::new("events_received"),
            succeeded: Counter::new("events_succeeded"),
            failed: Counter::new("events_failed"),
            rejected: Counter::new("envelopes_rejected"),
        }
    }
}

impl IngestStats {
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for counter in [&self.received, &self.succeeded, &self.failed, &self.rejected] {
            map.insert(counter.name().to_string(), counter.get().into());
        }
        serde_json::Value::Object(map)
    }
}

/// Runs the pipeline for each delivered event under the invocation deadline
#[derive(Clone)]
pub struct IngestHandler {
    pipeline: Arc<IngestionPipeline>,
    invocation_timeout: Duration,
    stats: IngestStats,
}

impl IngestHandler {
    pub fn new(pipeline: Arc<IngestionPipeline>, invocation_timeout: Duration) -> Self {
        Self {
            pipeline,
            invocation_timeout,
            stats: IngestStats::default(),
        }
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub async fn handle_event(&self, event: &RawEvent) -> std::result::Result<SensorReading, IngestError> {
        self.stats.received.inc();
        let ctx = InvocationContext::for_event(event).with_timeout(self.invocation_timeout);

        let result = self.pipeline.handle(event, &ctx).await;
        match &result {
            Ok(_) => self.stats.succeeded.inc(),
            Err(_) => self.stats.failed.inc(),
        }
        result
    }

    /// Unwrap a push delivery and handle it. The returned status is what
    /// the bus sees: 2xx acknowledges, anything else is redelivered.
    pub async fn handle_envelope(&self, envelope: PushEnvelope) -> u16 {
        let event = match envelope.into_raw_event() {
            Ok(event) => event,
            Err(e) => {
                self.stats.rejected.inc();
                warn!(error = %e, "Rejected push envelope");
                return e.status_code();
            }
        };

        match self.handle_event(&event).await {
            Ok(_) => 204,
            Err(e) => e.status_code(),
        }
    }
}

/// Health and readiness, shared by the service and its HTTP routes
#[derive(Clone)]
pub struct IngestHealth {
    stats: IngestStats,
    metrics: Arc<MetricsSink>,
    start_time: Instant,
}

impl IngestHealth {
    pub fn new(stats: IngestStats, metrics: Arc<MetricsSink>) -> Self {
        Self {
            stats,
            metrics,
            start_time: Instant::now(),
        }
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            service_id: crate::SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            counters: self.stats.to_json(),
        }
    }

    /// Ready once the metric views are registered with the exporter
    pub async fn ready(&self) -> ReadinessStatus {
        let registered = self.metrics.is_registered().await;
        ReadinessStatus {
            ready: true,
            dependencies: vec![DependencyStatus {
                name: "metrics_views".to_string(),
                available: registered,
                latency_ms: None,
            }],
        }
    }
}

pub struct IngestService {
    config: IngestConfig,
    handler: IngestHandler,
    health: IngestHealth,
    metrics: Arc<MetricsSink>,
}

impl IngestService {
    pub fn new(
        config: IngestConfig,
        metrics: Arc<MetricsSink>,
        log: Arc<LogSink>,
        logger: Arc<dyn EventLogger>,
    ) -> Self {
        let pipeline = Arc::new(IngestionPipeline::new(metrics.clone(), log, logger));
        let handler = IngestHandler::new(pipeline, config.invocation_timeout);
        let health = IngestHealth::new(handler.stats().clone(), metrics.clone());

        Self {
            config,
            handler,
            health,
            metrics,
        }
    }

    pub fn handler(&self) -> &IngestHandler {
        &self.handler
    }
}

#[async_trait]
impl BlackboxService for IngestService {
    fn service_id(&self) -> &'static str {
        crate::SERVICE_NAME
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    async fn health(&self) -> HealthStatus {
        self.health.health()
    }

    async fn ready(&self) -> ReadinessStatus {
        self.health.ready().await
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Shutting down Sensor Ingest, flushing metrics");
        self.metrics
            .shutdown()
            .await
            .map_err(|e| BlackboxError::Unavailable(e.to_string()))
    }

    async fn start(&self) -> Result<()> {
        let addr = self.config.service.bind_address()?;
        info!(
            http = %addr,
            sheet_id = %self.config.sheet_id,
            monitoring_project = ?self.config.project_id,
            "Starting Sensor Ingest push endpoint"
        );

        let router = api::create_router(api::AppState {
            handler: self.handler.clone(),
            health: self.health.clone(),
        });

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
