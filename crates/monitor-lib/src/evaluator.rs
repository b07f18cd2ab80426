//! Threshold evaluation
//!
//! Pure mapping from a snapshot (plus the previous snapshot of the same
//! family, needed for restart-burst detection) to candidate alerts. No
//! identity is assigned here; the alert engine keys candidates on
//! (type, subject).

use crate::config::{Thresholds, UsageBand};
use crate::error::EvaluationError;
use crate::models::{
    AlertKey, AlertLevel, AlertSubject, AlertType, ContainerStatus, DetailValue, Details,
    DockerStatus, GitHubRunnerStatus, Snapshot, SystemMetrics,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// An alert proposed for one cycle, before identity assignment and dedup
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateAlert {
    pub alert_type: AlertType,
    pub subject: AlertSubject,
    pub level: AlertLevel,
    pub message: String,
    pub details: Details,
    /// When the condition was last seen true; the pass time when unset
    pub observed_at: Option<DateTime<Utc>>,
}

impl CandidateAlert {
    pub fn new(
        alert_type: AlertType,
        subject: AlertSubject,
        level: AlertLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            alert_type,
            subject,
            level,
            message: message.into(),
            details: Details::new(),
            observed_at: None,
        }
    }

    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = Some(at);
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<DetailValue>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn key(&self) -> AlertKey {
        AlertKey::new(self.alert_type, self.subject.clone())
    }
}

/// Check that a snapshot is well-formed before it is accepted
pub fn validate(snapshot: &Snapshot) -> Result<(), EvaluationError> {
    match snapshot {
        Snapshot::Host(metrics) => validate_metrics(metrics),
        Snapshot::Docker(status) => validate_docker(status),
        Snapshot::Runners(runners) => validate_runners(runners),
    }
}

fn validate_ratio(field: &'static str, value: f64) -> Result<(), EvaluationError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EvaluationError::OutOfRange { field, value })
    }
}

fn validate_metrics(metrics: &SystemMetrics) -> Result<(), EvaluationError> {
    validate_ratio("cpu_usage", metrics.cpu_usage)?;
    validate_ratio("ram_usage", metrics.ram_usage)?;
    validate_ratio("ssd_usage", metrics.ssd_usage)?;

    if metrics.ram_used > metrics.ram_total {
        return Err(EvaluationError::Inconsistent(format!(
            "ram_used {} exceeds ram_total {}",
            metrics.ram_used, metrics.ram_total
        )));
    }
    if metrics.ssd_used > metrics.ssd_total {
        return Err(EvaluationError::Inconsistent(format!(
            "ssd_used {} exceeds ssd_total {}",
            metrics.ssd_used, metrics.ssd_total
        )));
    }
    if let Some(level) = metrics.battery_level {
        if level > 100 {
            return Err(EvaluationError::OutOfRange {
                field: "battery_level",
                value: f64::from(level),
            });
        }
    }
    Ok(())
}

fn validate_docker(status: &DockerStatus) -> Result<(), EvaluationError> {
    if !status.is_daemon_running && !status.containers.is_empty() {
        return Err(EvaluationError::Inconsistent(
            "daemon reported down but containers were listed".to_string(),
        ));
    }
    if status.containers.iter().any(|c| c.id.trim().is_empty()) {
        return Err(EvaluationError::Inconsistent(
            "container with empty id".to_string(),
        ));
    }
    Ok(())
}

fn validate_runners(runners: &[GitHubRunnerStatus]) -> Result<(), EvaluationError> {
    let mut seen = HashSet::new();
    for runner in runners {
        if !seen.insert(runner.id) {
            return Err(EvaluationError::Inconsistent(format!(
                "runner id {} listed twice",
                runner.id
            )));
        }
    }
    Ok(())
}

/// Evaluate one snapshot against the thresholds.
///
/// `previous` is the prior successful snapshot of the same family, if any.
/// The result is ordered by alert key so repeated calls compare equal.
pub fn evaluate(
    snapshot: &Snapshot,
    previous: Option<&Snapshot>,
    thresholds: &Thresholds,
) -> Result<Vec<CandidateAlert>, EvaluationError> {
    validate(snapshot)?;

    let mut candidates = match snapshot {
        Snapshot::Host(metrics) => evaluate_metrics(metrics, thresholds),
        Snapshot::Docker(status) => {
            let previous = match previous {
                Some(Snapshot::Docker(prev)) => Some(prev),
                _ => None,
            };
            evaluate_docker(status, previous, thresholds)
        }
        Snapshot::Runners(runners) => evaluate_runners(runners),
    };

    candidates.sort_by(|a, b| a.key().cmp(&b.key()));
    Ok(candidates)
}

fn usage_level(value: f64, band: &UsageBand) -> Option<(AlertLevel, f64)> {
    if value > band.critical {
        Some((AlertLevel::Critical, band.critical))
    } else if value > band.warning {
        Some((AlertLevel::Warning, band.warning))
    } else {
        None
    }
}

fn level_word(level: AlertLevel) -> &'static str {
    match level {
        AlertLevel::Warning => "warning",
        AlertLevel::Critical => "critical",
    }
}

fn evaluate_metrics(metrics: &SystemMetrics, thresholds: &Thresholds) -> Vec<CandidateAlert> {
    let mut candidates = Vec::new();

    if let Some((level, bound)) = usage_level(metrics.cpu_usage, &thresholds.cpu) {
        candidates.push(
            CandidateAlert::new(
                AlertType::CpuHigh,
                AlertSubject::Host,
                level,
                format!(
                    "CPU usage {:.1}% exceeds {} threshold {:.1}%",
                    metrics.cpu_usage * 100.0,
                    level_word(level),
                    bound * 100.0
                ),
            )
            .with_detail("value", metrics.cpu_usage)
            .with_detail("threshold", bound),
        );
    }

    if let Some((level, bound)) = usage_level(metrics.ram_usage, &thresholds.ram) {
        candidates.push(
            CandidateAlert::new(
                AlertType::RamHigh,
                AlertSubject::Host,
                level,
                format!(
                    "Memory usage {:.1}% exceeds {} threshold {:.1}%",
                    metrics.ram_usage * 100.0,
                    level_word(level),
                    bound * 100.0
                ),
            )
            .with_detail("value", metrics.ram_usage)
            .with_detail("threshold", bound)
            .with_detail("usedBytes", metrics.ram_used as i64)
            .with_detail("totalBytes", metrics.ram_total as i64),
        );
    }

    if let Some((level, bound)) = usage_level(metrics.ssd_usage, &thresholds.ssd) {
        candidates.push(
            CandidateAlert::new(
                AlertType::SsdHigh,
                AlertSubject::Host,
                level,
                format!(
                    "Disk usage {:.1}% exceeds {} threshold {:.1}%",
                    metrics.ssd_usage * 100.0,
                    level_word(level),
                    bound * 100.0
                ),
            )
            .with_detail("value", metrics.ssd_usage)
            .with_detail("threshold", bound)
            .with_detail("usedBytes", metrics.ssd_used as i64)
            .with_detail("totalBytes", metrics.ssd_total as i64),
        );
    }

    // Battery only matters when running on battery power
    if let (Some(battery), Some(false)) = (metrics.battery_level, metrics.is_power_connected) {
        let band = &thresholds.battery;
        let tripped = if battery < band.critical {
            Some((AlertLevel::Critical, band.critical))
        } else if battery < band.warning {
            Some((AlertLevel::Warning, band.warning))
        } else {
            None
        };

        if let Some((level, bound)) = tripped {
            candidates.push(
                CandidateAlert::new(
                    AlertType::BatteryLow,
                    AlertSubject::Host,
                    level,
                    format!(
                        "Battery at {}% on battery power, below {} threshold {}%",
                        battery,
                        level_word(level),
                        bound
                    ),
                )
                .with_detail("value", battery)
                .with_detail("threshold", bound)
                .with_detail("powerConnected", false),
            );
        }
    }

    candidates
}

/// Exit code from a runtime status line such as "Exited (137) 5 minutes ago"
fn exit_code(status: &str) -> Option<i32> {
    let start = status.find('(')?;
    let end = status[start..].find(')')? + start;
    status[start + 1..end].trim().parse().ok()
}

/// True when a stopped container did not stop on purpose.
///
/// Created, paused and missing containers are not considered down, and a
/// clean exit (code 0) is treated as an intentional stop.
pub fn is_unexpected_exit(container: &ContainerStatus) -> bool {
    if container.is_running || container.is_restarting {
        return false;
    }
    match container.state.to_ascii_lowercase().as_str() {
        "dead" => true,
        "exited" => exit_code(&container.status) != Some(0),
        _ => false,
    }
}

fn evaluate_docker(
    status: &DockerStatus,
    previous: Option<&DockerStatus>,
    thresholds: &Thresholds,
) -> Vec<CandidateAlert> {
    if !status.is_daemon_running {
        return vec![CandidateAlert::new(
            AlertType::DockerDaemonDown,
            AlertSubject::Daemon,
            AlertLevel::Critical,
            "Docker daemon is not responding",
        )
        .with_detail("status", "down")];
    }

    let mut candidates = Vec::new();

    for container in &status.containers {
        if is_unexpected_exit(container) {
            candidates.push(
                CandidateAlert::new(
                    AlertType::ContainerDown,
                    AlertSubject::Container(container.id.clone()),
                    AlertLevel::Critical,
                    format!(
                        "Container '{}' is down: {}",
                        container.name, container.status
                    ),
                )
                .with_detail("containerId", container.id.as_str())
                .with_detail("container", container.name.as_str())
                .with_detail("state", container.state.as_str())
                .with_detail("status", container.status.as_str()),
            );
        }

        let restart_delta = previous
            .and_then(|prev| prev.container(&container.id))
            .map(|prev| container.restart_count.saturating_sub(prev.restart_count));
        let burst = restart_delta.map_or(false, |delta| delta > thresholds.restart_burst);

        if container.is_restarting || burst {
            let message = if burst {
                format!(
                    "Container '{}' restarted {} times since the previous sample (restart count {})",
                    container.name,
                    restart_delta.unwrap_or_default(),
                    container.restart_count
                )
            } else {
                format!(
                    "Container '{}' is restarting (restart count {})",
                    container.name, container.restart_count
                )
            };

            let mut candidate = CandidateAlert::new(
                AlertType::ContainerRestarting,
                AlertSubject::Container(container.id.clone()),
                AlertLevel::Warning,
                message,
            )
            .with_detail("containerId", container.id.as_str())
            .with_detail("container", container.name.as_str())
            .with_detail("restartCount", container.restart_count);
            if let Some(delta) = restart_delta {
                candidate = candidate.with_detail("restartDelta", delta);
            }
            candidates.push(candidate);
        }
    }

    candidates
}

fn evaluate_runners(runners: &[GitHubRunnerStatus]) -> Vec<CandidateAlert> {
    runners
        .iter()
        .filter(|runner| !runner.is_online)
        .map(|runner| {
            CandidateAlert::new(
                AlertType::GithubRunnerOffline,
                AlertSubject::Runner(runner.id),
                AlertLevel::Warning,
                format!(
                    "GitHub runner '{}' is offline (status {})",
                    runner.name, runner.status
                ),
            )
            .with_detail("runnerId", runner.id as i64)
            .with_detail("runner", runner.name.as_str())
            .with_detail("status", runner.status.as_str())
        })
        .collect()
}
