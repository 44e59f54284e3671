//! Trigger errors

use blackbox_core::{BlackboxError, DeadlineExceeded};
use thiserror::Error;

/// Failure to signal a device
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("device cloud returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),
}

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error(transparent)]
    Config(#[from] BlackboxError),

    #[error("Error simulating catastrophe: deviceId={device}, error={source}")]
    Device {
        device: String,
        #[source]
        source: SignalError,
    },
}

impl TriggerError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(e) => e.error_code(),
            Self::Device { .. } => "DEVICE_SIGNAL_FAILED",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::Device { .. } => 502,
        }
    }
}
