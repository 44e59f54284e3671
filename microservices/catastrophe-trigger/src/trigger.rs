//! Device catastrophe trigger

use async_trait::async_trait;
use blackbox_core::{EventLogger, Fields, InvocationContext};
use rand::Rng;
use reqwest::Client;
use std::sync::Arc;
use tracing::debug;

use crate::error::{SignalError, TriggerError};

/// Remote function call on a single device
#[async_trait]
pub trait DeviceSignal: Send + Sync {
    async fn signal(&self, device_id: &str) -> Result<(), SignalError>;
}

/// Particle cloud client
pub struct ParticleClient {
    client: Client,
    base_url: String,
    access_token: String,
}

impl ParticleClient {
    pub fn new(client: Client, base_url: &str, access_token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    pub fn function_url(&self, device_id: &str) -> String {
        format!("{}/devices/{}/catastrophe", self.base_url, device_id)
    }
}

#[async_trait]
impl DeviceSignal for ParticleClient {
    async fn signal(&self, device_id: &str) -> Result<(), SignalError> {
        let url = self.function_url(device_id);
        debug!(device = %device_id, "Calling device function");

        let response = self
            .client
            .post(&url)
            .form(&[("access_token", self.access_token.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SignalError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Uniform pick from a non-empty list
pub fn select_device<'a, R: Rng + ?Sized>(device_ids: &'a [String], rng: &mut R) -> Option<&'a str> {
    if device_ids.is_empty() {
        return None;
    }
    Some(device_ids[rng.gen_range(0..device_ids.len())].as_str())
}

pub struct CatastropheTrigger {
    device_ids: Vec<String>,
    signal: Arc<dyn DeviceSignal>,
    logger: Arc<dyn EventLogger>,
}

impl CatastropheTrigger {
    pub fn new(
        device_ids: Vec<String>,
        signal: Arc<dyn DeviceSignal>,
        logger: Arc<dyn EventLogger>,
    ) -> Self {
        Self {
            device_ids,
            signal,
            logger,
        }
    }

    pub fn device_ids(&self) -> &[String] {
        &self.device_ids
    }

    /// Signal one randomly chosen device. The trigger event carries no data.
    pub async fn fire(&self, ctx: &InvocationContext) -> Result<String, TriggerError> {
        let result = self.fire_inner(ctx).await;

        let fields = Fields::new().with("invocation_id", ctx.invocation_id.to_string());
        match &result {
            Ok(device) => self.logger.info(
                &fields.with("message", format!("Simulated catastrophe on device {}", device)),
            ),
            Err(e) => self.logger.error(
                &fields
                    .with("message", e.to_string())
                    .with("error_code", e.error_code()),
            ),
        }
        result
    }

    async fn fire_inner(&self, ctx: &InvocationContext) -> Result<String, TriggerError> {
        let device = select_device(&self.device_ids, &mut rand::thread_rng())
            .ok_or_else(|| {
                blackbox_core::BlackboxError::Config(
                    "DEVICE_IDS environment variable not set".to_string(),
                )
            })?
            .to_string();

        ctx.run(self.signal.signal(&device))
            .await
            .map_err(SignalError::from)
            .and_then(|r| r)
            .map_err(|source| TriggerError::Device {
                device: device.clone(),
                source,
            })?;

        Ok(device)
    }
}
