//! Blackbox Core - Shared event types and service infrastructure
//!
//! This crate provides:
//! - Bus envelope types (raw events, push envelopes, invocation context)
//! - Standard service trait every microservice implements
//! - The structured event logger handed to handlers
//! - Error handling utilities
//! - Configuration helpers

pub mod config;
pub mod domain;
pub mod error;
pub mod logger;
pub mod service;

pub use config::ServiceConfig;
pub use domain::*;
pub use error::{BlackboxError, Result};
pub use logger::{EventLogger, Fields, TracingEventLogger};
pub use service::{BlackboxService, DependencyStatus, HealthStatus, MicroserviceRuntime, ReadinessStatus};
