//! Catastrophe Trigger Microservice
//!
//! Scheduled bus trigger that makes one random device simulate a
//! catastrophe via its cloud function.

use blackbox_core::{MicroserviceRuntime, TracingEventLogger};
use catastrophe_trigger::{ParticleClient, TriggerConfig, TriggerService};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _telemetry = blackbox_telemetry::init(catastrophe_trigger::SERVICE_NAME)?;

    info!("Starting Catastrophe Trigger");

    let config = TriggerConfig::from_env()?;

    let client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;
    let particle = ParticleClient::new(client, &config.api_url, config.access_token.clone());

    let service = TriggerService::new(config, Arc::new(particle), Arc::new(TracingEventLogger));
    MicroserviceRuntime::run(Arc::new(service)).await?;

    Ok(())
}
