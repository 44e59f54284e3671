//! Catastrophe trigger service wiring

use async_trait::async_trait;
use blackbox_core::{BlackboxService, EventLogger, HealthStatus, ReadinessStatus, Result};
use blackbox_telemetry::Counter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::api;
use crate::config::TriggerConfig;
use crate::trigger::{CatastropheTrigger, DeviceSignal};

/// Deadline for one device call, on top of the HTTP client timeout
pub const INVOCATION_TIMEOUT: Duration = Duration::from_secs(60);

pub struct TriggerService {
    config: TriggerConfig,
    state: api::AppState,
}

impl TriggerService {
    pub fn new(
        config: TriggerConfig,
        signal: Arc<dyn DeviceSignal>,
        logger: Arc<dyn EventLogger>,
    ) -> Self {
        let trigger = CatastropheTrigger::new(config.device_ids.clone(), signal, logger);
        let state = api::AppState {
            trigger: Arc::new(trigger),
            invocation_timeout: INVOCATION_TIMEOUT,
            fired: Counter::new("triggers_fired"),
            failed: Counter::new("triggers_failed"),
            start_time: Instant::now(),
        };
        Self { config, state }
    }

    pub fn trigger(&self) -> &CatastropheTrigger {
        &self.state.trigger
    }
}

#[async_trait]
impl BlackboxService for TriggerService {
    fn service_id(&self) -> &'static str {
        crate::SERVICE_NAME
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    async fn health(&self) -> HealthStatus {
        self.state.health()
    }

    async fn ready(&self) -> ReadinessStatus {
        self.state.ready()
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Shutting down Catastrophe Trigger");
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let addr = self.config.service.bind_address()?;
        info!(
            http = %addr,
            devices = self.config.device_ids.len(),
            api_url = %self.config.api_url,
            "Starting Catastrophe Trigger endpoint"
        );

        let router = api::create_router(self.state.clone());
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
