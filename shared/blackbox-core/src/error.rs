//! Error types for Blackbox services

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BlackboxError>;

#[derive(Error, Debug)]
pub enum BlackboxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl BlackboxError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Auth(_) => 401,
            Self::Unavailable(_) => 503,
            Self::Timeout(_) => 504,
            _ => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Network(_) => "NETWORK_ERROR",
            Self::Auth(_) => "AUTH_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Timeout(_) => "TIMEOUT",
        }
    }
}

impl From<std::io::Error> for BlackboxError {
    fn from(err: std::io::Error) -> Self {
        BlackboxError::Network(err.to_string())
    }
}
