//! Telemetry configuration.

use std::env;

/// Configuration for a node's tracing and metrics setup.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every span (usually the node id).
    pub service_name: String,
    /// Log level filter (trace, debug, info, warn, error), or an
    /// `EnvFilter`-compatible directive string.
    pub log_level: String,
    /// Emit JSON-formatted log lines instead of the human-readable format.
    pub json_logs: bool,
    /// Local port the Prometheus text exporter listens on, if any.
    pub metrics_port: Option<u16>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "memoria-node".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            metrics_port: None,
        }
    }
}

impl TelemetryConfig {
    /// Populate from environment variables, falling back to defaults.
    ///
    /// Reads `MEMORIA_SERVICE_NAME`, `RUST_LOG` / `MEMORIA_LOG_LEVEL`,
    /// `MEMORIA_JSON_LOGS`, and `MEMORIA_METRICS_PORT`. Parsing a config
    /// *file* or argv into this struct is out of scope here; this is just
    /// one convenience constructor alongside `Default`.
    pub fn from_env() -> Self {
        Self {
            service_name: env::var("MEMORIA_SERVICE_NAME")
                .unwrap_or_else(|_| "memoria-node".to_string()),
            log_level: env::var("MEMORIA_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),
            json_logs: env::var("MEMORIA_JSON_LOGS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            metrics_port: env::var("MEMORIA_METRICS_PORT")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    /// Build a config naming a specific node, keeping every other default.
    pub fn for_node(node_name: &str) -> Self {
        Self {
            service_name: node_name.to_string(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_quiet_and_human_readable() {
        let config = TelemetryConfig::default();
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
        assert!(config.metrics_port.is_none());
    }

    #[test]
    fn for_node_overrides_only_the_service_name() {
        let config = TelemetryConfig::for_node("peer-a");
        assert_eq!(config.service_name, "peer-a");
        assert_eq!(config.log_level, "info");
    }
}
