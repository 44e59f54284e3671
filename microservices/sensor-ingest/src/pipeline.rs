//! Ingestion pipeline
//!
//! ```text
//! Start -> Decoded -> TimestampResolved -> MetricsRecorded -> Appended -> Done
//!    \________\______________\___________________\__________-> Failed(stage)
//! ```
//!
//! Stages run strictly in order. The first failure ends the invocation;
//! earlier stages are not compensated, so a log append failure leaves the
//! metrics already recorded.

use blackbox_core::{EventLogger, Fields, InvocationContext, RawEvent};
use std::sync::Arc;
use tracing::debug;

use crate::decoder::decode_payload;
use crate::error::{IngestError, Stage};
use crate::log_sink::LogSink;
use crate::metrics_sink::MetricsSink;
use crate::reading::SensorReading;
use crate::timestamp::resolve_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    Decoded,
    TimestampResolved,
    MetricsRecorded,
    Appended,
    Done,
    Failed(Stage),
}

impl PipelineState {
    fn advance(&mut self, next: PipelineState) {
        let from = *self;
        debug!(from = ?from, to = ?next, "Pipeline transition");
        *self = next;
    }

    /// Stage that runs next from this state
    pub fn pending_stage(&self) -> Option<Stage> {
        match self {
            Self::Start => Some(Stage::Decode),
            Self::Decoded => Some(Stage::ResolveTimestamp),
            Self::TimestampResolved => Some(Stage::RecordMetrics),
            Self::MetricsRecorded => Some(Stage::AppendLog),
            Self::Appended | Self::Done | Self::Failed(_) => None,
        }
    }
}

pub struct IngestionPipeline {
    metrics: Arc<MetricsSink>,
    log: Arc<LogSink>,
    logger: Arc<dyn EventLogger>,
}

impl IngestionPipeline {
    pub fn new(metrics: Arc<MetricsSink>, log: Arc<LogSink>, logger: Arc<dyn EventLogger>) -> Self {
        Self {
            metrics,
            log,
            logger,
        }
    }

    /// Handle one bus event. Emits exactly one log line and returns the
    /// stored reading, or the error of the stage that failed.
    pub async fn handle(
        &self,
        event: &RawEvent,
        ctx: &InvocationContext,
    ) -> Result<SensorReading, IngestError> {
        let mut state = PipelineState::Start;

        match self.run(event, ctx, &mut state).await {
            Ok(reading) => {
                state.advance(PipelineState::Done);
                self.logger.info(&success_fields(&reading, ctx));
                Ok(reading)
            }
            Err(err) => {
                state.advance(PipelineState::Failed(err.stage()));
                self.logger.error(&failure_fields(&err, ctx));
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        event: &RawEvent,
        ctx: &InvocationContext,
        state: &mut PipelineState,
    ) -> Result<SensorReading, IngestError> {
        let payload = decode_payload(&event.data)?;
        state.advance(PipelineState::Decoded);

        let timestamp = resolve_timestamp(&event.attributes)?;
        let reading = SensorReading::new(payload, timestamp);
        state.advance(PipelineState::TimestampResolved);

        self.metrics.ensure_registered(ctx).await?;
        self.metrics.record(&reading, ctx).await?;
        state.advance(PipelineState::MetricsRecorded);

        self.log.append(&reading, ctx).await?;
        state.advance(PipelineState::Appended);

        Ok(reading)
    }
}

fn base_fields(ctx: &InvocationContext) -> Fields {
    let mut fields = Fields::new().with("invocation_id", ctx.invocation_id.to_string());
    if let Some(id) = &ctx.message_id {
        fields.insert("message_id", id.as_str());
    }
    fields
}

fn success_fields(reading: &SensorReading, ctx: &InvocationContext) -> Fields {
    base_fields(ctx)
        .with("message", "Appended data to the sheet")
        .with("timestamp", reading.timestamp.as_str())
        .with("device", reading.device.as_str())
        .with("temperature", reading.temperature)
        .with("humidity", reading.humidity)
        .with("pressure", reading.pressure)
        .with("air_quality", reading.air_quality)
}

fn failure_fields(err: &IngestError, ctx: &InvocationContext) -> Fields {
    let mut fields = base_fields(ctx)
        .with("message", "Sensor event failed")
        .with("stage", err.stage().as_str())
        .with("error_code", err.error_code())
        .with("error", err.to_string());
    if let Some(sink) = err.sink() {
        fields.insert("sink", sink.to_string());
    }
    fields
}
