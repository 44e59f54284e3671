//! Ingestion error types
//!
//! Every failure is tagged with the stage it happened in so the caller can
//! log it as one structured line.

use blackbox_core::BlackboxError;
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Pipeline stage a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Setup,
    Decode,
    ResolveTimestamp,
    RecordMetrics,
    AppendLog,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Decode => "decode",
            Self::ResolveTimestamp => "resolve_timestamp",
            Self::RecordMetrics => "record_metrics",
            Self::AppendLog => "append_log",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which sink a [`SinkError`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Metrics,
    Log,
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metrics => f.write_str("metrics"),
            Self::Log => f.write_str("log"),
        }
    }
}

/// The payload was not a JSON object of the expected shape
#[derive(Debug, Error)]
#[error("failed to unmarshal sensor data: data={}, error={cause}", String::from_utf8_lossy(.payload))]
pub struct DecodeError {
    #[source]
    pub cause: serde_json::Error,
    /// The bytes as received, for diagnostics
    pub payload: Bytes,
}

#[derive(Debug, Error)]
pub enum ResolveCause {
    #[error("attribute is missing")]
    Missing,

    #[error("value contains whitespace")]
    Whitespace,

    #[error("second 60 is not a valid publish time")]
    LeapSecond,

    #[error(transparent)]
    Malformed(#[from] chrono::ParseError),
}

/// The `published_at` attribute was absent or not in the expected format
#[derive(Debug, Error)]
#[error("failed to parse the timestamp: published_at={raw:?}, error={cause}")]
pub struct ResolveError {
    pub raw: String,
    #[source]
    pub cause: ResolveCause,
}

/// Required configuration is missing or invalid
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("configuration error: {0}")]
pub struct ConfigError(pub String);

impl From<BlackboxError> for ConfigError {
    fn from(err: BlackboxError) -> Self {
        match err {
            BlackboxError::Config(msg) => ConfigError(msg),
            other => ConfigError(other.to_string()),
        }
    }
}

/// A backend call failed
#[derive(Debug, Error)]
#[error("{sink} sink failed: {source}")]
pub struct SinkError {
    pub sink: SinkKind,
    pub source: BoxError,
}

impl SinkError {
    pub fn metrics<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            sink: SinkKind::Metrics,
            source: Box::new(err),
        }
    }

    pub fn log<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            sink: SinkKind::Log,
            source: Box::new(err),
        }
    }
}

/// Failure of one invocation, returned verbatim to the host
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl IngestError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Decode(_) => Stage::Decode,
            Self::Resolve(_) => Stage::ResolveTimestamp,
            Self::Config(_) => Stage::Setup,
            Self::Sink(e) => match e.sink {
                SinkKind::Metrics => Stage::RecordMetrics,
                SinkKind::Log => Stage::AppendLog,
            },
        }
    }

    pub fn sink(&self) -> Option<SinkKind> {
        match self {
            Self::Sink(e) => Some(e.sink),
            _ => None,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "DECODE_ERROR",
            Self::Resolve(_) => "RESOLVE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Sink(_) => "SINK_ERROR",
        }
    }

    /// Status returned to the push endpoint. Anything but 2xx makes the bus redeliver.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Decode(_) | Self::Resolve(_) => 422,
            Self::Config(_) => 500,
            Self::Sink(_) => 503,
        }
    }
}
