//! Structured event logging for handlers
//!
//! Handlers log exactly one line per invocation through an [`EventLogger`]
//! so the hosting layer decides where those lines go.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Key/value fields attached to one log line
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Fields(BTreeMap<String, Value>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn render(&self) -> (String, String) {
        let mut rest = self.0.clone();
        let message = match rest.remove("message") {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let fields = serde_json::to_string(&rest).unwrap_or_default();
        (message, fields)
    }
}

/// Logging capability injected into handlers
pub trait EventLogger: Send + Sync {
    fn info(&self, fields: &Fields);
    fn error(&self, fields: &Fields);
}

/// Default logger: forwards to `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingEventLogger;

impl EventLogger for TracingEventLogger {
    fn info(&self, fields: &Fields) {
        let (message, rendered) = fields.render();
        tracing::info!(target: "blackbox::events", fields = %rendered, "{}", message);
    }

    fn error(&self, fields: &Fields) {
        let (message, rendered) = fields.render();
        tracing::error!(target: "blackbox::events", fields = %rendered, "{}", message);
    }
}
