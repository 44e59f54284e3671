//! Push endpoint plus health and readiness routes

use axum::{extract::State, routing::{get, post}, Json, Router};
use axum::http::StatusCode;
use blackbox_core::{HealthStatus, PushEnvelope, ReadinessStatus};

use crate::service::{IngestHandler, IngestHealth};

#[derive(Clone)]
pub struct AppState {
    pub handler: IngestHandler,
    pub health: IngestHealth,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Bus push delivery
        .route("/", post(push))
        // Health
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(state)
}

async fn push(State(state): State<AppState>, Json(envelope): Json<PushEnvelope>) -> StatusCode {
    let status = state.handler.handle_envelope(envelope).await;
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.health.health())
}

async fn ready(State(state): State<AppState>) -> Json<ReadinessStatus> {
    Json(state.health.ready().await)
}
