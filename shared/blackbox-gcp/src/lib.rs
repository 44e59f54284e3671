//! Blackbox GCP Clients
//!
//! Thin REST clients for the Google Cloud services the sensor pipeline
//! writes into: Sheets (row append) and Cloud Monitoring (time series),
//! plus the access-token sources both authenticate with.

pub mod auth;
pub mod error;
pub mod monitoring;
pub mod sheets;

#[cfg(test)]
mod tests;

pub use auth::{token_source_from_env, MetadataTokenSource, StaticTokenSource, TokenSource};
pub use error::{GcpError, Result};
pub use monitoring::CloudMonitoringExporter;
pub use sheets::{CellValue, RowAppender, SheetsClient};
