//! Telemetry Configuration

/// Logging and span export settings
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// OTLP collector; spans are only exported when set
    pub otlp_endpoint: Option<String>,
    /// Filter directive used when `RUST_LOG` is unset
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            log_level: "info".to_string(),
            json_logs: true,
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            otlp_endpoint: non_empty("OTEL_EXPORTER_OTLP_ENDPOINT"),
            log_level: non_empty("RUST_LOG")
                .or_else(|| non_empty("LOG_LEVEL"))
                .unwrap_or(defaults.log_level),
            json_logs: non_empty("JSON_LOGS")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(defaults.json_logs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> TelemetryConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        TelemetryConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.otlp_endpoint, None);
        assert_eq!(config.log_level, "info");
        assert!(config.json_logs);
    }

    #[test]
    fn test_rust_log_wins_over_log_level() {
        assert_eq!(config(&[("LOG_LEVEL", "warn")]).log_level, "warn");
        assert_eq!(
            config(&[("LOG_LEVEL", "warn"), ("RUST_LOG", "sensor_ingest=debug")]).log_level,
            "sensor_ingest=debug"
        );
    }

    #[test]
    fn test_blank_endpoint_disables_export() {
        assert_eq!(config(&[("OTEL_EXPORTER_OTLP_ENDPOINT", " ")]).otlp_endpoint, None);
        assert_eq!(
            config(&[("OTEL_EXPORTER_OTLP_ENDPOINT", "http://collector:4317")])
                .otlp_endpoint
                .as_deref(),
            Some("http://collector:4317")
        );
    }

    #[test]
    fn test_plain_logs() {
        assert!(!config(&[("JSON_LOGS", "false")]).json_logs);
        assert!(config(&[("JSON_LOGS", "YES")]).json_logs);
    }
}
