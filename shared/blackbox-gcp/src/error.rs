//! GCP client error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GcpError>;

#[derive(Debug, Error)]
pub enum GcpError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GcpError {
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        GcpError::Api { status, body }
    }
}
