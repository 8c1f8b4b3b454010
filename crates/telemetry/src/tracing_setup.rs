//! `tracing-subscriber` initialization.
//!
//! The teacher's LGTM stack also shipped an OpenTelemetry/Tempo exporter;
//! dropped here (see DESIGN.md) since nothing in this crate produces
//! distributed traces worth exporting without a collector to point it at.
//! `tracing` spans/events still flow to stdout (or JSON) for local
//! observability and for `cargo test -- --nocapture`.

use tracing_subscriber::{util::SubscriberInitExt, EnvFilter, FmtSubscriber};

use crate::{TelemetryConfig, TelemetryError};

/// Guard returned by [`init_tracing`]. Holding it keeps the subscriber
/// installed; nothing needs explicit flushing since there is no batched
/// exporter underneath.
pub struct TracingGuard;

/// Install a global `tracing` subscriber built from `config`.
pub fn init_tracing(config: &TelemetryConfig) -> Result<TracingGuard, TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::Config(e.to_string()))?;

    let builder = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true);

    if config.json_logs {
        builder
            .json()
            .try_init()
            .map_err(|e| TelemetryError::TracerInit(e.to_string()))?;
    } else {
        builder
            .try_init()
            .map_err(|e| TelemetryError::TracerInit(e.to_string()))?;
    }

    tracing::info!(service = %config.service_name, "tracing initialized");
    Ok(TracingGuard)
}
