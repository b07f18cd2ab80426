//! Observability infrastructure for the fleet monitor
//!
//! Provides:
//! - Prometheus metrics (poll latency, collection errors, open alerts, notification outcomes)
//! - Structured JSON logging with tracing

use crate::alert::{AlertTransition, TransitionKind};
use crate::models::{AlertLevel, CollectorKind, OverallStatus};
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for poll latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    poll_latency_seconds: HistogramVec,
    collection_errors: IntCounterVec,
    skipped_ticks: IntCounterVec,
    evaluation_errors: IntCounterVec,
    open_alerts: IntGaugeVec,
    alert_transitions: IntCounterVec,
    notifications: IntCounterVec,
    overall_status: IntGauge,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            poll_latency_seconds: register_histogram_vec!(
                "fleet_monitor_poll_latency_seconds",
                "Time spent polling a health source",
                &["collector"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register poll_latency_seconds"),

            collection_errors: register_int_counter_vec!(
                "fleet_monitor_collection_errors_total",
                "Polls that failed or timed out",
                &["collector"]
            )
            .expect("Failed to register collection_errors"),

            skipped_ticks: register_int_counter_vec!(
                "fleet_monitor_skipped_ticks_total",
                "Ticks skipped because a poll overran its interval",
                &["collector"]
            )
            .expect("Failed to register skipped_ticks"),

            evaluation_errors: register_int_counter_vec!(
                "fleet_monitor_evaluation_errors_total",
                "Snapshots rejected by validation",
                &["collector"]
            )
            .expect("Failed to register evaluation_errors"),

            open_alerts: register_int_gauge_vec!(
                "fleet_monitor_open_alerts",
                "Alerts currently open",
                &["level"]
            )
            .expect("Failed to register open_alerts"),

            alert_transitions: register_int_counter_vec!(
                "fleet_monitor_alert_transitions_total",
                "Alert lifecycle transitions",
                &["kind"]
            )
            .expect("Failed to register alert_transitions"),

            notifications: register_int_counter_vec!(
                "fleet_monitor_notifications_total",
                "Notification outcomes",
                &["outcome"]
            )
            .expect("Failed to register notifications"),

            overall_status: register_int_gauge!(
                "fleet_monitor_overall_status",
                "Overall fleet status (0 healthy, 1 warning, 2 critical, 3 unknown)"
            )
            .expect("Failed to register overall_status"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance. Clones share the
/// same underlying metrics.
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

    pub fn observe_poll_latency(&self, kind: CollectorKind, duration_secs: f64) {
        self.inner()
            .poll_latency_seconds
            .with_label_values(&[kind.as_str()])
            .observe(duration_secs);
    }

    pub fn inc_collection_errors(&self, kind: CollectorKind) {
        self.inner()
            .collection_errors
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    pub fn inc_skipped_ticks(&self, kind: CollectorKind, skipped: u64) {
        self.inner()
            .skipped_ticks
            .with_label_values(&[kind.as_str()])
            .inc_by(skipped);
    }

    pub fn inc_evaluation_errors(&self, kind: CollectorKind) {
        self.inner()
            .evaluation_errors
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    /// Update open alert gauges from (warning, critical) counts
    pub fn set_open_alerts(&self, warning: usize, critical: usize) {
        let gauge = &self.inner().open_alerts;
        gauge
            .with_label_values(&[AlertLevel::Warning.as_str()])
            .set(warning as i64);
        gauge
            .with_label_values(&[AlertLevel::Critical.as_str()])
            .set(critical as i64);
    }

    pub fn inc_transition(&self, kind: TransitionKind) {
        self.inner()
            .alert_transitions
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    pub fn inc_notifications_sent(&self) {
        self.inner().notifications.with_label_values(&["sent"]).inc();
    }

    pub fn inc_notifications_failed(&self) {
        self.inner().notifications.with_label_values(&["failed"]).inc();
    }

    pub fn inc_notifications_suppressed(&self) {
        self.inner()
            .notifications
            .with_label_values(&["suppressed"])
            .inc();
    }

    pub fn set_overall_status(&self, status: OverallStatus) {
        self.inner().overall_status.set(status.as_gauge());
    }
}

/// Structured logger for monitor events
///
/// Emits named events with a consistent field set so they can be picked out
/// of the JSON log stream.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Log an alert transition
    pub fn log_transition(&self, transition: &AlertTransition) {
        let alert = &transition.alert;
        match transition.kind {
            TransitionKind::Raised => match alert.level {
                AlertLevel::Critical => warn!(
                    event = "alert_raised",
                    node = %self.node_name,
                    alert_id = %alert.id,
                    alert_type = %alert.alert_type,
                    subject = %alert.subject,
                    level = %alert.level,
                    message = %alert.message,
                    "Critical alert raised"
                ),
                AlertLevel::Warning => info!(
                    event = "alert_raised",
                    node = %self.node_name,
                    alert_id = %alert.id,
                    alert_type = %alert.alert_type,
                    subject = %alert.subject,
                    level = %alert.level,
                    message = %alert.message,
                    "Alert raised"
                ),
            },
            TransitionKind::Updated => info!(
                event = "alert_updated",
                node = %self.node_name,
                alert_id = %alert.id,
                alert_type = %alert.alert_type,
                level = %alert.level,
                message = %alert.message,
                "Alert updated"
            ),
            TransitionKind::Resolved => info!(
                event = "alert_resolved",
                node = %self.node_name,
                alert_id = %alert.id,
                alert_type = %alert.alert_type,
                subject = %alert.subject,
                open_secs = (transition.at - alert.raised_at).num_seconds(),
                "Alert resolved"
            ),
        }
    }

    /// Log a failed or timed-out poll
    pub fn log_collection_failure(&self, kind: CollectorKind, reason: &str, consecutive: u32) {
        warn!(
            event = "collection_failed",
            node = %self.node_name,
            collector = %kind,
            reason = %reason,
            consecutive_failures = consecutive,
            "Collection failed, keeping last snapshot"
        );
    }

    /// Log a snapshot rejected by validation
    pub fn log_evaluation_failure(&self, kind: CollectorKind, reason: &str) {
        warn!(
            event = "evaluation_failed",
            node = %self.node_name,
            collector = %kind,
            reason = %reason,
            "Snapshot rejected"
        );
    }

    /// Log a notification that could not be delivered
    pub fn log_delivery_failure(&self, sink: &str, alert_id: &str, reason: &str) {
        warn!(
            event = "notification_failed",
            node = %self.node_name,
            sink = %sink,
            alert_id = %alert_id,
            reason = %reason,
            "Failed to deliver notification"
        );
    }

    /// Log monitor startup
    pub fn log_startup(&self, version: &str, collectors: &[CollectorKind]) {
        let collectors: Vec<&str> = collectors.iter().map(|k| k.as_str()).collect();
        info!(
            event = "monitor_started",
            node = %self.node_name,
            version = %version,
            collectors = ?collectors,
            "Fleet monitor started"
        );
    }

    /// Log monitor shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Fleet monitor shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_metrics_creation() {
        let metrics = MonitorMetrics::new();

        metrics.observe_poll_latency(CollectorKind::Host, 0.2);
        metrics.inc_collection_errors(CollectorKind::Docker);
        metrics.inc_skipped_ticks(CollectorKind::Runners, 2);
        metrics.inc_evaluation_errors(CollectorKind::Host);
        metrics.set_open_alerts(2, 1);
        metrics.inc_transition(TransitionKind::Raised);
        metrics.inc_notifications_sent();
        metrics.inc_notifications_failed();
        metrics.inc_notifications_suppressed();
        metrics.set_overall_status(OverallStatus::Critical);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "fleet_monitor_overall_status"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-node");
        assert_eq!(logger.node_name(), "test-node");
    }
}
