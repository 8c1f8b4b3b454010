//! Prometheus metrics for the block store.
//!
//! Naming convention: `memoria_<component>_<metric>_<unit>`.

use lazy_static::lazy_static;
use prometheus::{exponential_buckets, Counter, CounterVec, Gauge, GaugeVec, Histogram, Opts, Registry, TextEncoder, Encoder};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry. Matches the teacher's process-scoped
    /// `lazy_static` pattern rather than threading a registry handle
    /// through every constructor.
    pub static ref REGISTRY: Registry = Registry::new();

    // --- Silo metrics ---

    /// Bytes currently stored, per silo label.
    pub static ref SILO_USAGE_BYTES: GaugeVec = GaugeVec::new(
        Opts::new("memoria_silo_usage_bytes", "Bytes currently stored in a silo"),
        &["silo"],
    ).expect("metric creation failed");

    /// Number of keys currently stored, per silo label.
    pub static ref SILO_BLOCK_COUNT: GaugeVec = GaugeVec::new(
        Opts::new("memoria_silo_block_count", "Number of blocks currently stored in a silo"),
        &["silo"],
    ).expect("metric creation failed");

    /// Silo operations by kind and outcome (get/set/erase, ok/error).
    pub static ref SILO_OPERATIONS: CounterVec = CounterVec::new(
        Opts::new("memoria_silo_operations_total", "Silo operations by kind and outcome"),
        &["op", "outcome"],
    ).expect("metric creation failed");

    // --- Dock / connection metrics ---

    /// Currently open peer connections.
    pub static ref DOCK_CONNECTIONS: Gauge = Gauge::new(
        "memoria_dock_connections", "Currently open peer connections"
    ).expect("metric creation failed");

    /// RPC round-trip duration.
    pub static ref RPC_DURATION: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "memoria_rpc_duration_seconds", "RPC round-trip duration"
        ).buckets(exponential_buckets(0.0005, 2.0, 14).unwrap())
    ).expect("metric creation failed");

    /// RPC attempts by method and outcome.
    pub static ref RPC_ATTEMPTS: CounterVec = CounterVec::new(
        Opts::new("memoria_rpc_attempts_total", "RPC attempts by method and outcome"),
        &["method", "outcome"],
    ).expect("metric creation failed");

    // --- Consensus metrics ---

    /// Paxos rounds run, by phase and outcome.
    pub static ref PAXOS_ROUNDS: CounterVec = CounterVec::new(
        Opts::new("memoria_paxos_rounds_total", "Paxos rounds by phase and outcome"),
        &["phase", "outcome"],
    ).expect("metric creation failed");

    /// Quorum reconfigurations performed.
    pub static ref QUORUM_RECONFIGURATIONS: Counter = Counter::new(
        "memoria_quorum_reconfigurations_total", "Quorum reconfigurations performed"
    ).expect("metric creation failed");

    /// Conflicts surfaced to callers after a resolver declined to retry.
    pub static ref CONSENSUS_CONFLICTS: Counter = Counter::new(
        "memoria_consensus_conflicts_total", "Conflicts surfaced after resolver abstained"
    ).expect("metric creation failed");

    // --- Model-facade metrics ---

    /// Fetch/insert/update/remove calls by outcome.
    pub static ref MODEL_OPERATIONS: CounterVec = CounterVec::new(
        Opts::new("memoria_model_operations_total", "Model facade operations by kind and outcome"),
        &["op", "outcome"],
    ).expect("metric creation failed");
}

/// Handle for the metrics registry. Dropping it does not unregister
/// anything (the registry is process-global); it exists purely so
/// `init_telemetry`'s caller has something to hold for the process
/// lifetime, matching the teacher's `TelemetryGuard` shape.
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register every metric with the global registry. Safe to call once per
/// process; a second call returns `MetricsInit` because Prometheus
/// rejects duplicate registrations.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(SILO_USAGE_BYTES.clone()),
        Box::new(SILO_BLOCK_COUNT.clone()),
        Box::new(SILO_OPERATIONS.clone()),
        Box::new(DOCK_CONNECTIONS.clone()),
        Box::new(RPC_DURATION.clone()),
        Box::new(RPC_ATTEMPTS.clone()),
        Box::new(PAXOS_ROUNDS.clone()),
        Box::new(QUORUM_RECONFIGURATIONS.clone()),
        Box::new(CONSENSUS_CONFLICTS.clone()),
        Box::new(MODEL_OPERATIONS.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode every registered metric as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard: observes elapsed seconds into a histogram when dropped.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start timing against `histogram`.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Time a block of code into a histogram; observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_metrics_is_idempotent_enough_to_call_once() {
        let _ = register_metrics();
    }

    #[test]
    fn silo_usage_gauge_tracks_per_silo_labels() {
        SILO_USAGE_BYTES.with_label_values(&["memory-0"]).set(128.0);
        assert_eq!(SILO_USAGE_BYTES.with_label_values(&["memory-0"]).get(), 128.0);
    }

    #[test]
    fn histogram_timer_observes_on_drop() {
        let _timer = HistogramTimer::new(&RPC_DURATION);
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
}
