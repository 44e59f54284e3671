//! Metrics primitives
//!
//! Measures are recorded with a tag set into last-value gauges. Each
//! registered view becomes an OpenTelemetry `f64` observable gauge whose
//! callback reports the latest value per projected tag set, so every
//! collection cycle stamps the points with the collection time.

use chrono::{DateTime, Utc};
use opentelemetry::metrics::{Meter, ObservableGauge, Unit};
use opentelemetry::KeyValue;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Longest tag value the monitoring backend accepts.
pub const MAX_TAG_VALUE_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid tag {key}: {reason}")]
    InvalidTag { key: String, reason: &'static str },

    #[error("view {0} is already registered with a different definition")]
    ConflictingView(String),

    #[error("instrument {name} rejected: {reason}")]
    Instrument { name: String, reason: String },

    #[error("exporter error: {0}")]
    Export(String),

    #[error("exporter unavailable: {0}")]
    Unavailable(String),
}

/// Simple counter metric
#[derive(Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
    name: String,
}

impl Counter {
    pub fn new(name: &str) -> Self {
        Self {
            value: Arc::new(AtomicU64::new(0)),
            name: name.to_string(),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A validated key/value pair attached to a recording
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    key: String,
    value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self, MetricsError> {
        let key = key.into();
        let value = value.into();

        if key.is_empty() {
            return Err(MetricsError::InvalidTag {
                key,
                reason: "key must not be empty",
            });
        }
        if value.len() > MAX_TAG_VALUE_LEN {
            return Err(MetricsError::InvalidTag {
                key,
                reason: "value longer than 255 bytes",
            });
        }
        if !value.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
            return Err(MetricsError::InvalidTag {
                key,
                reason: "value must be printable ASCII",
            });
        }

        Ok(Self { key, value })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn to_key_value(&self) -> KeyValue {
        KeyValue::new(self.key.clone(), self.value.clone())
    }
}

/// A named float64 quantity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measure {
    pub name: String,
    pub description: String,
    pub unit: String,
}

impl Measure {
    pub fn float64(name: &str, description: &str, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            unit: unit.to_string(),
        }
    }

    /// One recorded value of this measure
    pub fn m(&self, value: f64) -> Measurement {
        Measurement {
            measure: self.name.clone(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub measure: String,
    pub value: f64,
}

/// A last-value gauge over one measure, broken down by `tag_keys`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub name: String,
    pub description: String,
    pub measure: Measure,
    pub tag_keys: Vec<String>,
}

/// One collected gauge point, as handed to exporters
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    /// Collection time of this point
    pub time: DateTime<Utc>,
}

/// Projected tags of one gauge series, ordered by key
type Series = Vec<Tag>;

struct Gauge {
    view: View,
    values: Arc<RwLock<HashMap<Series, f64>>>,
    _instrument: ObservableGauge<f64>,
}

/// Registered views backed by observable gauges on one meter
pub struct LastValueGauges {
    meter: Meter,
    gauges: RwLock<HashMap<String, Gauge>>,
}

impl LastValueGauges {
    pub fn new(meter: Meter) -> Self {
        Self {
            meter,
            gauges: RwLock::new(HashMap::new()),
        }
    }

    /// Create one gauge per view. Re-registering an identical view is a no-op.
    pub fn register(&self, views: &[View]) -> Result<(), MetricsError> {
        let mut gauges = self.gauges.write();

        // Validate the whole batch before creating any instrument.
        for view in views {
            if let Some(existing) = gauges.get(&view.name) {
                if existing.view != *view {
                    return Err(MetricsError::ConflictingView(view.name.clone()));
                }
            }
        }

        for view in views {
            if gauges.contains_key(&view.name) {
                continue;
            }

            let values: Arc<RwLock<HashMap<Series, f64>>> = Arc::default();
            let observed = values.clone();
            let instrument = self
                .meter
                .f64_observable_gauge(view.name.clone())
                .with_description(view.description.clone())
                .with_unit(Unit::new(view.measure.unit.clone()))
                .with_callback(move |gauge| {
                    for (series, value) in observed.read().iter() {
                        let attributes: Vec<KeyValue> =
                            series.iter().map(Tag::to_key_value).collect();
                        gauge.observe(*value, &attributes);
                    }
                })
                .try_init()
                .map_err(|e| MetricsError::Instrument {
                    name: view.name.clone(),
                    reason: e.to_string(),
                })?;

            gauges.insert(
                view.name.clone(),
                Gauge {
                    view: view.clone(),
                    values,
                    _instrument: instrument,
                },
            );
        }
        Ok(())
    }

    pub fn is_registered(&self, view_name: &str) -> bool {
        self.gauges.read().contains_key(view_name)
    }

    pub fn len(&self) -> usize {
        self.gauges.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.gauges.read().is_empty()
    }

    /// Record measurements under `tags`. Returns how many gauges were updated;
    /// measurements with no registered view are dropped.
    pub fn record(&self, tags: &[Tag], measurements: &[Measurement]) -> usize {
        let gauges = self.gauges.read();
        let mut updated = 0;

        for gauge in gauges.values() {
            let Some(measurement) = measurements
                .iter()
                .rev()
                .find(|m| m.measure == gauge.view.measure.name)
            else {
                continue;
            };

            let mut series: Series = tags
                .iter()
                .filter(|t| gauge.view.tag_keys.iter().any(|k| k == t.key()))
                .cloned()
                .collect();
            series.sort_by(|a, b| a.key.cmp(&b.key));

            gauge.values.write().insert(series, measurement.value);
            updated += 1;
        }

        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry_sdk::metrics::MeterProvider;

    fn temperature_view() -> View {
        View {
            name: "blackbox/temperature/last".to_string(),
            description: "The distribution of the temperatures".to_string(),
            measure: Measure::float64("blackbox/m/temperature/last", "The temperature in celsius", "c"),
            tag_keys: vec!["device".to_string()],
        }
    }

    fn gauges() -> LastValueGauges {
        LastValueGauges::new(MeterProvider::default().meter("blackbox-test"))
    }

    fn device(value: &str) -> Tag {
        Tag::new("device", value).expect("valid tag")
    }

    #[test]
    fn test_counter() {
        let counter = Counter::new("test_counter");
        assert_eq!(counter.get(), 0);
        counter.inc();
        assert_eq!(counter.get(), 1);
        counter.add(5);
        assert_eq!(counter.get(), 6);
        assert_eq!(counter.name(), "test_counter");
    }

    #[test]
    fn test_tag_validation() {
        assert!(Tag::new("device", "kitchen").is_ok());
        assert!(Tag::new("device", "").is_ok());
        assert!(Tag::new("", "kitchen").is_err());
        assert!(Tag::new("device", "k\u{e9}ken").is_err());
        assert!(Tag::new("device", "line\nbreak").is_err());
        assert!(Tag::new("device", "x".repeat(MAX_TAG_VALUE_LEN)).is_ok());
        assert!(Tag::new("device", "x".repeat(MAX_TAG_VALUE_LEN + 1)).is_err());
    }

    #[test]
    fn test_tag_key_value() {
        let kv = device("kitchen").to_key_value();
        assert_eq!(kv.key.as_str(), "device");
        assert_eq!(kv.value.as_str(), "kitchen");
    }

    #[test]
    fn test_register_same_view_twice_is_noop() {
        let gauges = gauges();
        gauges.register(&[temperature_view()]).unwrap();
        gauges.register(&[temperature_view()]).unwrap();
        assert_eq!(gauges.len(), 1);
        assert!(gauges.is_registered("blackbox/temperature/last"));
    }

    #[test]
    fn test_register_conflicting_view_fails() {
        let gauges = gauges();
        gauges.register(&[temperature_view()]).unwrap();

        let mut changed = temperature_view();
        changed.tag_keys.clear();
        match gauges.register(&[changed]) {
            Err(MetricsError::ConflictingView(name)) => {
                assert_eq!(name, "blackbox/temperature/last")
            }
            other => panic!("expected ConflictingView, got {:?}", other),
        }
    }

    #[test]
    fn test_record_drops_unregistered_measures() {
        let gauges = gauges();
        let view = temperature_view();
        gauges.register(&[view.clone()]).unwrap();

        let other = Measure::float64("blackbox/m/unknown", "", "1");
        let updated = gauges.record(
            &[device("kitchen"), Tag::new("room", "north").unwrap()],
            &[view.measure.m(1.0), other.m(2.0)],
        );
        assert_eq!(updated, 1);
    }

    #[test]
    fn test_record_before_registration_is_dropped() {
        let gauges = gauges();
        let view = temperature_view();
        assert_eq!(gauges.record(&[device("kitchen")], &[view.measure.m(1.0)]), 0);
    }
}
