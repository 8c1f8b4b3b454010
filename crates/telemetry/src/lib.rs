//! Tracing-subscriber initialization and Prometheus metric registration,
//! used by every binary-producing crate in the workspace.

#![warn(missing_docs)]

mod config;
mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    encode_metrics, register_metrics, HistogramTimer, MetricsHandle, CONSENSUS_CONFLICTS,
    DOCK_CONNECTIONS, MODEL_OPERATIONS, PAXOS_ROUNDS, QUORUM_RECONFIGURATIONS, RPC_ATTEMPTS,
    RPC_DURATION, SILO_BLOCK_COUNT, SILO_OPERATIONS, SILO_USAGE_BYTES,
};
pub use tracing_setup::TracingGuard;

use thiserror::Error;

/// Telemetry initialization errors.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The tracing subscriber failed to install (usually: already installed).
    #[error("failed to initialize tracing subscriber: {0}")]
    TracerInit(String),

    /// A Prometheus metric failed to register or encode.
    #[error("failed to initialize prometheus metrics: {0}")]
    MetricsInit(String),

    /// The supplied `TelemetryConfig` could not be turned into a filter.
    #[error("invalid telemetry configuration: {0}")]
    Config(String),
}

/// Initialize tracing and metrics together. Returns a guard that should be
/// held for the lifetime of the process; dropping it only logs a shutdown
/// message; since there is no batched exporter underneath, there is
/// nothing left to flush.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics_handle = register_metrics()?;
    let tracing_guard = tracing_setup::init_tracing(&config)?;

    Ok(TelemetryGuard {
        _tracing: tracing_guard,
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active. Drop at process shutdown.
pub struct TelemetryGuard {
    _tracing: TracingGuard,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("shutting down telemetry");
    }
}

/// Record a metric increment, optionally with label values.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}

/// Record a metric observation, optionally with label values.
#[macro_export]
macro_rules! metric_observe {
    ($metric:expr, $value:expr) => {
        $metric.observe($value)
    };
    ($metric:expr, $labels:expr, $value:expr) => {
        $metric.with_label_values($labels).observe($value)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_names_the_node() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "memoria-node");
    }
}
