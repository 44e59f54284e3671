//! Trigger endpoint plus health and readiness routes

use axum::{extract::State, routing::{get, post}, Json, Router};
use axum::http::StatusCode;
use blackbox_core::{DependencyStatus, HealthStatus, InvocationContext, ReadinessStatus};
use blackbox_telemetry::Counter;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::trigger::CatastropheTrigger;

#[derive(Clone)]
pub struct AppState {
    pub trigger: Arc<CatastropheTrigger>,
    pub invocation_timeout: Duration,
    pub fired: Counter,
    pub failed: Counter,
    pub start_time: Instant,
}

impl AppState {
    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            service_id: crate::SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            counters: serde_json::json!({
                "triggers_fired": self.fired.get(),
                "triggers_failed": self.failed.get(),
            }),
        }
    }

    /// Ready when there is at least one device to signal
    pub fn ready(&self) -> ReadinessStatus {
        ReadinessStatus {
            ready: !self.trigger.device_ids().is_empty(),
            dependencies: vec![DependencyStatus {
                name: "particle_cloud".to_string(),
                available: true,
                latency_ms: None,
            }],
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Bus push delivery; the message body is only a trigger
        .route("/", post(fire))
        // Health
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(state)
}

async fn fire(State(state): State<AppState>) -> StatusCode {
    let ctx = InvocationContext::new().with_timeout(state.invocation_timeout);
    match state.trigger.fire(&ctx).await {
        Ok(_) => {
            state.fired.inc();
            StatusCode::NO_CONTENT
        }
        Err(e) => {
            state.failed.inc();
            StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.health())
}

async fn ready(State(state): State<AppState>) -> Json<ReadinessStatus> {
    Json(state.ready())
}
