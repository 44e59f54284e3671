//! Bus event types shared by every handler

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::BlackboxError;

/// Bus message identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message as delivered by the bus, owned for the length of one invocation.
#[derive(Debug, Clone, Default)]
pub struct RawEvent {
    pub data: Bytes,
    pub attributes: HashMap<String, String>,
    pub publish_time: String,
    pub message_id: Option<MessageId>,
}

impl RawEvent {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Push delivery wrapper posted by the bus to an HTTP endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    /// Base64 encoded payload
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub attributes: Option<HashMap<String, String>>,
    #[serde(default, alias = "message_id")]
    pub message_id: Option<String>,
    #[serde(default, alias = "publish_time")]
    pub publish_time: Option<String>,
}

impl PushEnvelope {
    /// Unwrap the envelope, decoding the base64 payload.
    pub fn into_raw_event(self) -> Result<RawEvent, BlackboxError> {
        let message = self.message;
        let data = match message.data.as_deref() {
            None | Some("") => Bytes::new(),
            Some(encoded) => Bytes::from(decode_base64(encoded)?),
        };

        Ok(RawEvent {
            data,
            attributes: message.attributes.unwrap_or_default(),
            publish_time: message.publish_time.unwrap_or_default(),
            message_id: message.message_id.map(MessageId),
        })
    }
}

// Publishers differ on the alphabet; accept both.
fn decode_base64(encoded: &str) -> Result<Vec<u8>, BlackboxError> {
    STANDARD
        .decode(encoded)
        .or_else(|_| URL_SAFE.decode(encoded))
        .map_err(|e| BlackboxError::Validation(format!("Invalid base64 message data: {}", e)))
}

#[derive(Debug, Clone, Copy, Error)]
#[error("invocation deadline exceeded")]
pub struct DeadlineExceeded;

/// Per-invocation context threaded through every backend call.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub invocation_id: Uuid,
    pub message_id: Option<MessageId>,
    deadline: Option<Instant>,
}

impl Default for InvocationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl InvocationContext {
    pub fn new() -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            message_id: None,
            deadline: None,
        }
    }

    pub fn for_event(event: &RawEvent) -> Self {
        Self {
            message_id: event.message_id.clone(),
            ..Self::new()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Drive `fut` to completion unless the invocation deadline passes first.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, DeadlineExceeded>
    where
        F: Future,
    {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| DeadlineExceeded),
            None => Ok(fut.await),
        }
    }
}
