//! Observability infrastructure for the detection service
//!
//! Provides:
//! - Prometheus metrics (training duration, scoring latency, anomaly rates, model version)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge, register_gauge_vec, register_histogram, register_int_counter,
    register_int_gauge, Gauge, GaugeVec, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Buckets for per-window scoring latency (in seconds)
const SCORING_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Buckets for full training cycles (in seconds)
const TRAINING_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

static GLOBAL_METRICS: OnceLock<DetectorMetricsInner> = OnceLock::new();

struct DetectorMetricsInner {
    training_duration_seconds: Histogram,
    scoring_latency_seconds: Histogram,
    model_info: GaugeVec,
    last_anomaly_percentage: Gauge,
    alerted_addresses: IntGauge,
    training_cycles: IntCounter,
    training_failures: IntCounter,
    anomalies_detected: IntCounter,
    new_alerts: IntCounter,
}

impl DetectorMetricsInner {
    fn new() -> Self {
        Self {
            training_duration_seconds: register_histogram!(
                "sentinel_training_duration_seconds",
                "Time spent fetching logs and fitting a new model",
                TRAINING_BUCKETS.to_vec()
            )
            .expect("Failed to register training_duration_seconds"),

            scoring_latency_seconds: register_histogram!(
                "sentinel_scoring_latency_seconds",
                "Time spent classifying one log window",
                SCORING_BUCKETS.to_vec()
            )
            .expect("Failed to register scoring_latency_seconds"),

            model_info: register_gauge_vec!(
                "sentinel_model_info",
                "Version of the currently published model",
                &["version"]
            )
            .expect("Failed to register model_info"),

            last_anomaly_percentage: register_gauge!(
                "sentinel_last_anomaly_percentage",
                "Anomaly percentage of the most recently scored window"
            )
            .expect("Failed to register last_anomaly_percentage"),

            alerted_addresses: register_int_gauge!(
                "sentinel_alerted_addresses",
                "Distinct source addresses alerted since startup"
            )
            .expect("Failed to register alerted_addresses"),

            training_cycles: register_int_counter!(
                "sentinel_training_cycles_total",
                "Training cycles that published a model"
            )
            .expect("Failed to register training_cycles"),

            training_failures: register_int_counter!(
                "sentinel_training_failures_total",
                "Training cycles skipped or failed"
            )
            .expect("Failed to register training_failures"),

            anomalies_detected: register_int_counter!(
                "sentinel_anomalies_detected_total",
                "Log records classified as anomalous"
            )
            .expect("Failed to register anomalies_detected"),

            new_alerts: register_int_counter!(
                "sentinel_new_alerts_total",
                "Offending addresses surfaced for the first time"
            )
            .expect("Failed to register new_alerts"),
        }
    }
}

/// Detector metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct DetectorMetrics {
    _private: (),
}

impl Default for DetectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(DetectorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &DetectorMetricsInner {
        GLOBAL_METRICS.get_or_init(DetectorMetricsInner::new)
    }

    pub fn observe_training_duration(&self, duration_secs: f64) {
        self.inner().training_duration_seconds.observe(duration_secs);
    }

    pub fn observe_scoring_latency(&self, duration_secs: f64) {
        self.inner().scoring_latency_seconds.observe(duration_secs);
    }

    /// Replace the published model version label
    pub fn set_model_version(&self, version: &str) {
        self.inner().model_info.reset();
        self.inner()
            .model_info
            .with_label_values(&[version])
            .set(1.0);
    }

    pub fn set_last_anomaly_percentage(&self, percentage: f64) {
        self.inner().last_anomaly_percentage.set(percentage);
    }

    pub fn set_alerted_addresses(&self, count: i64) {
        self.inner().alerted_addresses.set(count);
    }

    pub fn inc_training_cycles(&self) {
        self.inner().training_cycles.inc();
    }

    pub fn inc_training_failures(&self) {
        self.inner().training_failures.inc();
    }

    pub fn add_anomalies_detected(&self, count: u64) {
        self.inner().anomalies_detected.inc_by(count);
    }

    pub fn add_new_alerts(&self, count: u64) {
        self.inner().new_alerts.inc_by(count);
    }
}

/// Structured logger for detector events
///
/// Every event carries an `event` field so log pipelines can filter on it.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_startup(&self, version: &str, model_version: Option<&str>, demo_mode: bool) {
        info!(
            event = "server_started",
            service = %self.service,
            server_version = %version,
            model_version = model_version.unwrap_or("none"),
            demo_mode = demo_mode,
            "Sentinel started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "server_shutdown",
            service = %self.service,
            reason = %reason,
            "Sentinel shutting down"
        );
    }

    pub fn log_model_trained(&self, version: &str, samples: usize, duration_ms: u128) {
        info!(
            event = "model_trained",
            service = %self.service,
            version = %version,
            samples = samples,
            duration_ms = duration_ms,
            "Trained anomaly model"
        );
    }

    pub fn log_training_skipped(&self, reason: &str) {
        warn!(
            event = "model_training_skipped",
            service = %self.service,
            reason = %reason,
            "Training cycle skipped, keeping previous model"
        );
    }

    pub fn log_model_published(&self, old_version: Option<&str>, new_version: &str) {
        info!(
            event = "model_published",
            service = %self.service,
            old_version = old_version.unwrap_or("none"),
            new_version = %new_version,
            "Anomaly model published"
        );
    }

    pub fn log_new_offender(&self, address: &str, anomalous_requests: usize) {
        warn!(
            event = "new_offender_alert",
            service = %self.service,
            ip_address = %address,
            anomalous_requests = anomalous_requests,
            "New offending address detected"
        );
    }

    pub fn log_store_unavailable(&self, error: &str) {
        warn!(
            event = "store_unavailable",
            service = %self.service,
            error = %error,
            "Log store unavailable"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_metrics_handles_share_registry() {
        let metrics = DetectorMetrics::new();
        let other = metrics.clone();

        metrics.observe_training_duration(0.4);
        metrics.observe_scoring_latency(0.002);
        metrics.set_model_version("v20240101000000");
        other.set_last_anomaly_percentage(15.1);
        other.set_alerted_addresses(2);
        metrics.inc_training_cycles();
        metrics.inc_training_failures();
        metrics.add_anomalies_detected(146);
        metrics.add_new_alerts(2);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "sentinel_anomalies_detected_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("sentinel");
        assert_eq!(logger.service, "sentinel");
        logger.log_training_skipped("insufficient data");
    }
}
