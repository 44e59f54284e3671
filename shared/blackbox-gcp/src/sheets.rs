//! Google Sheets append client

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::auth::TokenSource;
use crate::error::{GcpError, Result};

pub const DEFAULT_SHEETS_URL: &str = "https://sheets.googleapis.com/v4";
pub const DEFAULT_RANGE: &str = "A1";

/// One cell of an appended row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// Append-one-row capability of a tabular log backend
#[async_trait]
pub trait RowAppender: Send + Sync {
    async fn append_row(&self, sheet_id: &str, row: &[CellValue]) -> Result<()>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ValueRange<'a> {
    pub major_dimension: &'static str,
    pub values: [&'a [CellValue]; 1],
}

impl<'a> ValueRange<'a> {
    pub(crate) fn single_row(row: &'a [CellValue]) -> Self {
        Self {
            major_dimension: "ROWS",
            values: [row],
        }
    }
}

/// REST client for `spreadsheets.values.append`
pub struct SheetsClient {
    client: Client,
    base_url: String,
    range: String,
    tokens: Arc<dyn TokenSource>,
}

impl SheetsClient {
    pub fn new(client: Client, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client,
            base_url: DEFAULT_SHEETS_URL.to_string(),
            range: DEFAULT_RANGE.to_string(),
            tokens,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = range.into();
        self
    }

    pub fn append_url(&self, sheet_id: &str) -> String {
        format!(
            "{}/spreadsheets/{}/values/{}:append",
            self.base_url, sheet_id, self.range
        )
    }
}

#[async_trait]
impl RowAppender for SheetsClient {
    /// Rows go after the last populated row and are parsed as if typed by a user.
    async fn append_row(&self, sheet_id: &str, row: &[CellValue]) -> Result<()> {
        if sheet_id.is_empty() {
            return Err(GcpError::Config("sheet id is empty".to_string()));
        }

        let token = self.tokens.access_token().await?;
        let url = self.append_url(sheet_id);

        debug!(sheet_id = %sheet_id, cells = row.len(), "Appending row to sheet");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&ValueRange::single_row(row))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(GcpError::from_response(response).await)
        }
    }
}
