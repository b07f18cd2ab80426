//! Reduction of all signals into one SystemHealth view

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    Alert, AlertLevel, CollectorKind, DockerStatus, GitHubRunnerStatus, HealthCheckResult,
    OverallStatus, SystemHealth, SystemMetrics,
};

/// Collection state of one registered collector as seen by the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorView {
    pub kind: CollectorKind,
    /// At least one poll has produced an accepted snapshot
    pub has_succeeded: bool,
    /// The most recent poll failed (error, timeout or rejected snapshot)
    pub stale: bool,
}

/// Latest accepted snapshots plus collector state, copied out of the store
#[derive(Debug, Clone, Default)]
pub struct AggregationInput {
    pub system: Option<SystemMetrics>,
    pub docker: Option<DockerStatus>,
    pub runners: Vec<GitHubRunnerStatus>,
    pub collectors: Vec<CollectorView>,
    pub checks: Vec<HealthCheckResult>,
}

/// Overall status, first match wins:
/// UNKNOWN when nothing ever succeeded, CRITICAL on any critical alert,
/// WARNING on any warning alert or stale collector, HEALTHY otherwise.
pub fn overall_status(open_alerts: &[Alert], collectors: &[CollectorView]) -> OverallStatus {
    if !collectors.iter().any(|c| c.has_succeeded) {
        return OverallStatus::Unknown;
    }
    if open_alerts.iter().any(|a| a.level == AlertLevel::Critical) {
        return OverallStatus::Critical;
    }
    if open_alerts.iter().any(|a| a.level == AlertLevel::Warning)
        || collectors.iter().any(|c| c.stale)
    {
        return OverallStatus::Warning;
    }
    OverallStatus::Healthy
}

/// Build the health view. `retention` bounds the number of alerts surfaced,
/// most recently observed first.
pub fn aggregate(
    input: AggregationInput,
    open_alerts: &[Alert],
    retention: usize,
    now: DateTime<Utc>,
) -> SystemHealth {
    let overall_status = overall_status(open_alerts, &input.collectors);

    let mut recent_alerts = open_alerts.to_vec();
    recent_alerts.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.key().cmp(&b.key()))
    });
    recent_alerts.truncate(retention);

    SystemHealth {
        system: input.system,
        docker: input.docker,
        runners: input.runners,
        recent_alerts,
        checks: input.checks,
        overall_status,
        timestamp: now,
    }
}
