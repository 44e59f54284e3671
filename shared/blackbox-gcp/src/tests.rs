//! Unit tests for the GCP clients

use std::collections::BTreeMap;
use std::sync::Arc;

use blackbox_telemetry::MetricPoint;
use chrono::{TimeZone, Utc};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use crate::auth::{MetadataTokenSource, StaticTokenSource, TokenSource};
use crate::monitoring::{CloudMonitoringExporter, MAX_SERIES_PER_REQUEST};
use crate::sheets::{CellValue, SheetsClient, ValueRange};

fn static_tokens() -> Arc<dyn TokenSource> {
    Arc::new(StaticTokenSource::new("ya29.test").expect("non-empty token"))
}

fn point(name: &str, device: &str, value: f64) -> MetricPoint {
    let mut labels = BTreeMap::new();
    labels.insert("device".to_string(), device.to_string());
    MetricPoint {
        name: name.to_string(),
        description: String::new(),
        unit: "c".to_string(),
        labels,
        value,
        time: Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 0).unwrap(),
    }
}

#[test]
fn test_cell_values_serialize_as_plain_json() {
    let row = vec![
        CellValue::from("03/05/2024 2:07 PM"),
        CellValue::from("kitchen"),
        CellValue::from(21.5),
        CellValue::from(1013.2),
    ];
    let body = serde_json::to_value(ValueRange::single_row(&row)).unwrap();
    assert_eq!(
        body,
        json!({
            "majorDimension": "ROWS",
            "values": [["03/05/2024 2:07 PM", "kitchen", 21.5, 1013.2]]
        })
    );
}

#[test]
fn test_sheets_append_url() {
    let client = SheetsClient::new(reqwest::Client::new(), static_tokens());
    assert_eq!(
        client.append_url("1AbC"),
        "https://sheets.googleapis.com/v4/spreadsheets/1AbC/values/A1:append"
    );

    let client = SheetsClient::new(reqwest::Client::new(), static_tokens())
        .with_base_url("http://localhost:9000/v4/")
        .with_range("Readings!A1");
    assert_eq!(
        client.append_url("1AbC"),
        "http://localhost:9000/v4/spreadsheets/1AbC/values/Readings!A1:append"
    );
}

#[tokio::test]
async fn test_sheets_rejects_empty_sheet_id() {
    use crate::sheets::RowAppender;

    let client = SheetsClient::new(reqwest::Client::new(), static_tokens());
    let result = client.append_row("", &[CellValue::from(1.0)]).await;
    assert_err!(result);
}

#[tokio::test]
async fn test_static_token_source() {
    let tokens = static_tokens();
    assert_eq!(assert_ok!(tokens.access_token().await), "ya29.test");
    assert_err!(StaticTokenSource::new("  "));
}

#[test]
fn test_metadata_endpoint() {
    let source = MetadataTokenSource::new(reqwest::Client::new(), "169.254.169.254");
    assert_eq!(
        source.endpoint(),
        "http://169.254.169.254/computeMetadata/v1/instance/service-accounts/default/token"
    );
}

#[test]
fn test_time_series_shape() {
    let exporter =
        CloudMonitoringExporter::new(reqwest::Client::new(), "blackbox-iot", static_tokens())
            .unwrap();
    let series = exporter.to_time_series(&point("blackbox/temperature/last", "kitchen", 21.5));

    assert_eq!(
        serde_json::to_value(&series).unwrap(),
        json!({
            "metric": {
                "type": "custom.googleapis.com/opencensus/blackbox/temperature/last",
                "labels": {"device": "kitchen"}
            },
            "resource": {"type": "global", "labels": {"project_id": "blackbox-iot"}},
            "metricKind": "GAUGE",
            "valueType": "DOUBLE",
            "points": [{
                "interval": {"endTime": "2024-03-05T14:07:00.000000Z"},
                "value": {"doubleValue": 21.5}
            }]
        })
    );
    assert_eq!(
        exporter.create_url(),
        "https://monitoring.googleapis.com/v3/projects/blackbox-iot/timeSeries"
    );
}

#[test]
fn test_requests_are_chunked() {
    let exporter =
        CloudMonitoringExporter::new(reqwest::Client::new(), "blackbox-iot", static_tokens())
            .unwrap();
    let points: Vec<MetricPoint> = (0..MAX_SERIES_PER_REQUEST + 5)
        .map(|i| point("blackbox/pressure/last", &format!("device-{}", i), i as f64))
        .collect();

    let requests = exporter.build_requests(&points);
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].time_series.len(), MAX_SERIES_PER_REQUEST);
    assert_eq!(requests[1].time_series.len(), 5);
}

#[test]
fn test_exporter_requires_project() {
    assert!(CloudMonitoringExporter::new(reqwest::Client::new(), "", static_tokens()).is_err());
}
