//! Sheet log sink

use blackbox_core::InvocationContext;
use blackbox_gcp::{CellValue, RowAppender};
use std::sync::Arc;
use tracing::debug;

use crate::error::{ConfigError, SinkError};
use crate::reading::SensorReading;

/// Appends one row per reading to the configured sheet.
///
/// The sheet has no dedup, so a redelivered event is appended again.
pub struct LogSink {
    sheet_id: String,
    appender: Arc<dyn RowAppender>,
}

impl LogSink {
    pub fn new(sheet_id: impl Into<String>, appender: Arc<dyn RowAppender>) -> Result<Self, ConfigError> {
        let sheet_id = sheet_id.into();
        if sheet_id.trim().is_empty() {
            return Err(ConfigError("SHEET_ID environment variable not set".to_string()));
        }
        Ok(Self { sheet_id, appender })
    }

    pub fn sheet_id(&self) -> &str {
        &self.sheet_id
    }

    /// Row layout: timestamp, device, temperature, humidity, pressure, air quality.
    pub fn row(reading: &SensorReading) -> Vec<CellValue> {
        vec![
            CellValue::from(reading.timestamp.as_str()),
            CellValue::from(reading.device.as_str()),
            CellValue::from(reading.temperature),
            CellValue::from(reading.humidity),
            CellValue::from(reading.pressure),
            CellValue::from(reading.air_quality),
        ]
    }

    pub async fn append(&self, reading: &SensorReading, ctx: &InvocationContext) -> Result<(), SinkError> {
        let row = Self::row(reading);

        ctx.run(self.appender.append_row(&self.sheet_id, &row))
            .await
            .map_err(SinkError::log)?
            .map_err(SinkError::log)?;

        debug!(sheet_id = %self.sheet_id, device = %reading.device, "Appended data to the sheet");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use blackbox_gcp::GcpError;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MemorySheet {
        rows: Mutex<Vec<(String, Vec<CellValue>)>>,
    }

    #[async_trait]
    impl RowAppender for MemorySheet {
        async fn append_row(&self, sheet_id: &str, row: &[CellValue]) -> blackbox_gcp::Result<()> {
            self.rows.lock().push((sheet_id.to_string(), row.to_vec()));
            Ok(())
        }
    }

    struct StalledSheet;

    #[async_trait]
    impl RowAppender for StalledSheet {
        async fn append_row(&self, _sheet_id: &str, _row: &[CellValue]) -> blackbox_gcp::Result<()> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(GcpError::Api {
                status: 500,
                body: "unreachable".to_string(),
            })
        }
    }

    fn reading() -> SensorReading {
        SensorReading {
            timestamp: crate::reading::DisplayTimestamp::new("03/05/2024 2:07 PM".to_string()),
            device: "kitchen".to_string(),
            temperature: 21.5,
            humidity: 40.0,
            pressure: 1013.2,
            air_quality: 12.0,
        }
    }

    #[test]
    fn test_empty_sheet_id_is_config_error() {
        let result = LogSink::new("  ", Arc::new(MemorySheet::default()));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_append_writes_one_ordered_row() {
        let sheet = Arc::new(MemorySheet::default());
        let sink = LogSink::new("sheet-123", sheet.clone()).unwrap();

        sink.append(&reading(), &InvocationContext::new()).await.unwrap();

        let rows = sheet.rows.lock();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "sheet-123");
        assert_eq!(
            rows[0].1,
            vec![
                CellValue::Text("03/05/2024 2:07 PM".to_string()),
                CellValue::Text("kitchen".to_string()),
                CellValue::Number(21.5),
                CellValue::Number(40.0),
                CellValue::Number(1013.2),
                CellValue::Number(12.0),
            ]
        );
    }

    #[tokio::test]
    async fn test_deadline_is_honored() {
        let sink = LogSink::new("sheet-123", Arc::new(StalledSheet)).unwrap();
        let ctx = InvocationContext::new().with_timeout(Duration::from_millis(20));

        let err = sink.append(&reading(), &ctx).await.unwrap_err();
        assert_eq!(err.sink, crate::error::SinkKind::Log);
        assert_eq!(err.source.to_string(), "invocation deadline exceeded");
    }
}
