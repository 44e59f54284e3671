//! Sensor Ingest
//!
//! Handles one bus event per invocation:
//! - decodes the JSON sensor payload
//! - resolves the display timestamp from the `published_at` attribute
//! - records last-value metrics tagged by device
//! - appends one row to the sheet log
//!
//! Any stage failure stops the invocation and is reported back to the
//! bus, which may redeliver. Rows are appended at least once; a
//! redelivered event produces a duplicate row.

pub mod api;
pub mod config;
pub mod decoder;
pub mod error;
pub mod log_sink;
pub mod metrics_sink;
pub mod pipeline;
pub mod reading;
pub mod service;
pub mod timestamp;


pub const SERVICE_NAME: &str = "sensor-ingest";

pub use config::IngestConfig;
pub use error::{ConfigError, DecodeError, IngestError, ResolveError, SinkError, SinkKind, Stage};
pub use log_sink::LogSink;
pub use metrics_sink::{MetricsBackend, MetricsSink, RegistryBackend};
pub use pipeline::{IngestionPipeline, PipelineState};
pub use reading::{DisplayTimestamp, SensorPayload, SensorReading};
pub use service::IngestService;
