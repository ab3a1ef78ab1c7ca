//! Observability infrastructure for scalers
//!
//! Provides:
//! - Prometheus metrics (pool size, RPC latency and errors, stream reconnects)
//! - Structured JSON logging of trigger events with tracing

use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Histogram buckets for RPC latency (in seconds)
const RPC_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

static GLOBAL_METRICS: OnceLock<ScalerMetricsInner> = OnceLock::new();

struct ScalerMetricsInner {
    pool_connections: IntGauge,
    connections_created: IntCounter,
    connections_evicted: IntCounter,
    rpc_errors: IntCounterVec,
    rpc_duration_seconds: HistogramVec,
    stream_reconnects: IntCounter,
    stream_messages: IntCounter,
}

impl ScalerMetricsInner {
    fn new() -> Self {
        Self {
            pool_connections: register_int_gauge!(
                "external_scaler_pool_connections",
                "Number of live transports held by the connection pool"
            )
            .expect("Failed to register pool_connections"),

            connections_created: register_int_counter!(
                "external_scaler_connections_created_total",
                "Transports built by the connection pool"
            )
            .expect("Failed to register connections_created"),

            connections_evicted: register_int_counter!(
                "external_scaler_connections_evicted_total",
                "Transports removed from the pool after shutdown"
            )
            .expect("Failed to register connections_evicted"),

            rpc_errors: register_int_counter_vec!(
                "external_scaler_rpc_errors_total",
                "Failed calls to remote external scalers",
                &["rpc"]
            )
            .expect("Failed to register rpc_errors"),

            rpc_duration_seconds: register_histogram_vec!(
                "external_scaler_rpc_duration_seconds",
                "Latency of unary calls to remote external scalers",
                &["rpc"],
                RPC_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register rpc_duration_seconds"),

            stream_reconnects: register_int_counter!(
                "external_scaler_stream_reconnects_total",
                "Reconnect attempts of push-mode activity streams"
            )
            .expect("Failed to register stream_reconnects"),

            stream_messages: register_int_counter!(
                "external_scaler_stream_messages_total",
                "Activity updates received from push-mode streams"
            )
            .expect("Failed to register stream_messages"),
        }
    }
}

/// Handle to the process-wide scaler metrics.
///
/// Clones share the same underlying collectors.
#[derive(Clone)]
pub struct ScalerMetrics {
    _private: (),
}

impl Default for ScalerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScalerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ScalerMetrics")
    }
}

impl ScalerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ScalerMetricsInner {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new)
    }

    /// The gauge is process-wide and assumes one `ConnectionPool` per
    /// process; a second pool overwrites the first one's count.
    pub fn set_pool_connections(&self, count: usize) {
        self.inner().pool_connections.set(count as i64);
    }

    pub fn inc_connections_created(&self) {
        self.inner().connections_created.inc();
    }

    pub fn inc_connections_evicted(&self) {
        self.inner().connections_evicted.inc();
    }

    pub fn inc_rpc_error(&self, rpc: &str) {
        self.inner().rpc_errors.with_label_values(&[rpc]).inc();
    }

    pub fn observe_rpc_duration(&self, rpc: &str, elapsed: Duration) {
        self.inner()
            .rpc_duration_seconds
            .with_label_values(&[rpc])
            .observe(elapsed.as_secs_f64());
    }

    pub fn inc_stream_reconnects(&self) {
        self.inner().stream_reconnects.inc();
    }

    pub fn inc_stream_messages(&self) {
        self.inner().stream_messages.inc();
    }
}

/// Structured logger for host-level trigger events
#[derive(Clone)]
pub struct StructuredLogger {
    workload: String,
}

impl StructuredLogger {
    pub fn new(workload: impl Into<String>) -> Self {
        Self {
            workload: workload.into(),
        }
    }

    pub fn log_startup(&self, version: &str, push: bool) {
        info!(
            event = "probe_started",
            workload = %self.workload,
            version = %version,
            push = push,
            "Scaler probe started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "probe_shutdown",
            workload = %self.workload,
            reason = %reason,
            "Scaler probe shutting down"
        );
    }

    pub fn log_evaluation(&self, metric_name: &str, values: &[f64], active: bool) {
        info!(
            event = "trigger_evaluated",
            workload = %self.workload,
            metric_name = %metric_name,
            values = ?values,
            active = active,
            "Trigger evaluated"
        );
    }

    pub fn log_evaluation_failure(&self, metric_name: &str, error: &str, consecutive: u32) {
        warn!(
            event = "trigger_evaluation_failed",
            workload = %self.workload,
            metric_name = %metric_name,
            error = %error,
            consecutive_failures = consecutive,
            "Trigger could not be evaluated, keeping previous state"
        );
    }

    pub fn log_activity(&self, active: bool) {
        info!(
            event = "activity_changed",
            workload = %self.workload,
            active = active,
            "Push scaler reported activity"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaler_metrics_handles_share_registry() {
        let first = ScalerMetrics::new();
        let second = ScalerMetrics::default();

        first.set_pool_connections(2);
        second.inc_connections_created();
        second.inc_rpc_error("GetMetrics");
        first.observe_rpc_duration("GetMetrics", Duration::from_millis(12));
        first.inc_stream_reconnects();
        first.inc_stream_messages();

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "external_scaler_rpc_errors_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("jobs/worker");
        assert_eq!(logger.workload, "jobs/worker");
    }
}
