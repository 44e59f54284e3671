//! Configuration for Catastrophe Trigger

use blackbox_core::config::{env_or, parse_env, required_env};
use blackbox_core::{BlackboxError, ServiceConfig};
use std::time::Duration;

pub const DEFAULT_PARTICLE_API_URL: &str = "https://api.particle.io/v1";

#[derive(Clone)]
pub struct TriggerConfig {
    pub service: ServiceConfig,
    pub access_token: String,
    pub device_ids: Vec<String>,
    pub api_url: String,
    pub http_timeout: Duration,
}

impl std::fmt::Debug for TriggerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerConfig")
            .field("service", &self.service)
            .field("access_token", &"<redacted>")
            .field("device_ids", &self.device_ids)
            .field("api_url", &self.api_url)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl TriggerConfig {
    pub fn from_env() -> Result<Self, BlackboxError> {
        Ok(Self {
            service: ServiceConfig::from_env(crate::SERVICE_NAME)?,
            access_token: required_env("PARTICLE_ACCESS_TOKEN")?,
            device_ids: parse_device_ids(&required_env("DEVICE_IDS")?)?,
            api_url: env_or("PARTICLE_API_URL", DEFAULT_PARTICLE_API_URL),
            http_timeout: Duration::from_secs(parse_env("HTTP_TIMEOUT_SECS", 30)?),
        })
    }
}

/// Split a comma separated id list, dropping blank entries.
pub fn parse_device_ids(raw: &str) -> Result<Vec<String>, BlackboxError> {
    let ids: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();

    if ids.is_empty() {
        return Err(BlackboxError::Config(
            "DEVICE_IDS environment variable not set".to_string(),
        ));
    }
    Ok(ids)
}
