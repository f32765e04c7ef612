//! Observability infrastructure for the monitor
//!
//! Provides:
//! - Prometheus metrics (cycle latency, containers, alerts, notifications, errors, retention)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

use crate::anomaly::Delivery;
use crate::models::AlertEvent;

/// Histogram buckets for cycle latency (in seconds); a cycle shells out to docker
const CYCLE_LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    cycle_latency_seconds: Histogram,
    containers_monitored: IntGauge,
    last_cycle_timestamp: IntGauge,
    alerts_total: IntCounterVec,
    notifications_total: IntCounterVec,
    collection_errors: IntCounter,
    storage_errors: IntCounter,
    pruned_rows: IntCounter,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "docker_monitor_cycle_latency_seconds",
                "Time spent on one collect, detect and notify cycle",
                CYCLE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            containers_monitored: register_int_gauge!(
                "docker_monitor_containers_monitored",
                "Number of containers in the latest cycle"
            )
            .expect("Failed to register containers_monitored"),

            last_cycle_timestamp: register_int_gauge!(
                "docker_monitor_last_cycle_timestamp_seconds",
                "Unix time of the latest completed cycle"
            )
            .expect("Failed to register last_cycle_timestamp"),

            alerts_total: register_int_counter_vec!(
                "docker_monitor_alerts_total",
                "Alerts raised by the detector",
                &["type"]
            )
            .expect("Failed to register alerts_total"),

            notifications_total: register_int_counter_vec!(
                "docker_monitor_notifications_total",
                "Notification dispatch outcomes",
                &["outcome"]
            )
            .expect("Failed to register notifications_total"),

            collection_errors: register_int_counter!(
                "docker_monitor_collection_errors_total",
                "Cycles aborted because a collector failed"
            )
            .expect("Failed to register collection_errors"),

            storage_errors: register_int_counter!(
                "docker_monitor_storage_errors_total",
                "Failed database writes and cleanups"
            )
            .expect("Failed to register storage_errors"),

            pruned_rows: register_int_counter!(
                "docker_monitor_pruned_rows_total",
                "Rows deleted by retention cleanup"
            )
            .expect("Failed to register pruned_rows"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn observe_cycle_latency(&self, duration: Duration) {
        self.inner()
            .cycle_latency_seconds
            .observe(duration.as_secs_f64());
    }

    pub fn set_containers_monitored(&self, count: usize) {
        self.inner().containers_monitored.set(count as i64);
    }

    pub fn set_last_cycle(&self, unix_secs: i64) {
        self.inner().last_cycle_timestamp.set(unix_secs);
    }

    pub fn inc_alert(&self, alert: &AlertEvent) {
        self.inner()
            .alerts_total
            .with_label_values(&[alert.kind.as_str()])
            .inc();
    }

    pub fn inc_notification(&self, delivery: Delivery) {
        self.inner()
            .notifications_total
            .with_label_values(&[delivery.as_str()])
            .inc();
    }

    pub fn inc_collection_errors(&self) {
        self.inner().collection_errors.inc();
    }

    pub fn inc_storage_errors(&self) {
        self.inner().storage_errors.inc();
    }

    pub fn add_pruned_rows(&self, rows: usize) {
        self.inner().pruned_rows.inc_by(rows as u64);
    }
}

/// Structured logger for monitor events
///
/// Every record carries an `event` field so log pipelines can filter on it.
#[derive(Clone)]
pub struct StructuredLogger {
    host_name: String,
}

impl StructuredLogger {
    pub fn new(host_name: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
        }
    }

    pub fn log_alert(&self, alert: &AlertEvent) {
        warn!(
            event = "alert_detected",
            host = %self.host_name,
            alert_type = %alert.kind,
            target = %alert.target,
            value = alert.value,
            message = %alert.message,
            "Anomaly detected"
        );
    }

    pub fn log_cycle(&self, containers: usize, alerts: usize, duration: Duration) {
        info!(
            event = "cycle_completed",
            host = %self.host_name,
            containers = containers,
            alerts = alerts,
            duration_ms = duration.as_millis() as u64,
            "Collection cycle completed"
        );
    }

    pub fn log_cleanup(&self, deleted_rows: usize, retention_days: u64) {
        info!(
            event = "retention_cleanup",
            host = %self.host_name,
            deleted_rows = deleted_rows,
            retention_days = retention_days,
            "Old samples and alerts removed"
        );
    }

    pub fn log_startup(&self, version: &str, interval: Duration, notifications: bool) {
        info!(
            event = "monitor_started",
            host = %self.host_name,
            version = %version,
            interval_secs = interval.as_secs(),
            notifications_enabled = notifications,
            "Docker monitor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            host = %self.host_name,
            reason = %reason,
            "Docker monitor shutting down"
        );
    }
}
