//! Configuration management for microservices

use crate::error::{BlackboxError, Result};
use serde::Deserialize;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Settings every microservice shares
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

impl ServiceConfig {
    pub fn from_env(default_name: &str) -> Result<Self> {
        Ok(Self {
            service_name: env_or("SERVICE_NAME", default_name),
            host: env_or("HOST", "0.0.0.0"),
            port: parse_env("PORT", 8080)?,
            log_level: env_or("LOG_LEVEL", "info"),
        })
    }

    /// Socket address the HTTP surface binds to
    pub fn bind_address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| BlackboxError::Config(format!("Invalid bind address: {}", e)))
    }
}

/// Read a variable, falling back to `default` when unset
pub fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Read a variable that must be present and non-empty
pub fn required_env(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(BlackboxError::Config(format!(
            "{} environment variable not set",
            name
        ))),
    }
}

/// Read and parse a variable, falling back to `default` when unset
pub fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| BlackboxError::Config(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}
