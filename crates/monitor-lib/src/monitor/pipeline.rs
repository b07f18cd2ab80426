//! Outcome -> evaluation -> alert engine -> aggregation
//!
//! Every poll outcome triggers one pass over the latest accepted snapshot of
//! every collector. The pass runs under the alert engine lock, so passes are
//! never interleaved and the published view always matches the open set.

use super::MonitorState;
use crate::aggregator::aggregate;
use crate::alert::{AlertEngine, AlertTransition};
use crate::collector::PollOutcome;
use crate::evaluator::{evaluate, validate};
use crate::models::{AlertLevel, HealthCheckResult, Snapshot};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Consume poll outcomes until every collection loop has stopped
pub async fn run_pipeline(state: Arc<MonitorState>, mut outcomes: mpsc::Receiver<PollOutcome>) {
    info!("Starting monitor pipeline");
    while let Some(outcome) = outcomes.recv().await {
        state.handle_outcome(outcome).await;
    }
    info!("Monitor pipeline stopped");
}

impl MonitorState {
    /// Record one poll outcome and run an evaluation pass
    pub async fn handle_outcome(&self, outcome: PollOutcome) -> Vec<AlertTransition> {
        let PollOutcome { kind, result, at, .. } = outcome;

        let check = match result {
            Ok(snapshot) => match validate(&snapshot) {
                Ok(()) => {
                    let check = snapshot_check(&snapshot, at);
                    self.store.record_success(snapshot, at);
                    check
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.store.record_failure(kind, reason.clone(), at);
                    self.metrics.inc_evaluation_errors(kind);
                    self.logger.log_evaluation_failure(kind, &reason);
                    HealthCheckResult::unhealthy(kind.as_str(), format!("Snapshot rejected: {}", reason), at)
                }
            },
            Err(e) => {
                let reason = e.to_string();
                self.store.record_failure(kind, reason.clone(), at);
                let consecutive = self
                    .store
                    .state(kind)
                    .map(|s| s.consecutive_failures)
                    .unwrap_or(1);
                self.logger.log_collection_failure(kind, &reason, consecutive);
                HealthCheckResult::unhealthy(kind.as_str(), reason, at)
                    .with_detail("consecutiveFailures", consecutive)
            }
        };
        self.registry.update(check).await;

        self.reevaluate().await
    }

    /// Evaluate every accepted snapshot plus standing application errors in
    /// one engine pass, publish the new view and forward the transitions
    pub async fn reevaluate(&self) -> Vec<AlertTransition> {
        let mut engine = self.engine.lock().await;

        let mut candidates = self.application_candidates();
        for accepted in self.store.snapshots() {
            let observed_at = accepted.observed_at;
            match evaluate(
                &accepted.latest,
                accepted.previous.as_deref(),
                &self.settings.thresholds,
            ) {
                Ok(found) => {
                    candidates.extend(found.into_iter().map(|c| c.observed_at(observed_at)))
                }
                Err(e) => warn!(collector = %accepted.latest.kind(), error = %e, "Evaluation failed"),
            }
        }

        let now = self.clock.now();
        let transitions = engine.apply(candidates, now);
        self.publish(&engine).await;

        for transition in &transitions {
            self.logger.log_transition(transition);
            self.metrics.inc_transition(transition.kind);
            self.forward(transition.clone());
        }

        transitions
    }

    /// Aggregate and swap in a new health view. Callers hold the engine lock.
    pub(super) async fn publish(&self, engine: &AlertEngine) {
        let open = engine.open_alerts();
        let critical = open.iter().filter(|a| a.level == AlertLevel::Critical).count();
        self.metrics.set_open_alerts(open.len() - critical, critical);

        let checks = self.registry.checks().await;
        let input = self.store.aggregation_input(checks);
        let health = aggregate(input, &open, self.settings.alert_retention, self.clock.now());

        debug!(
            overall_status = %health.overall_status,
            open_alerts = open.len(),
            "Published health view"
        );
        self.metrics.set_overall_status(health.overall_status);
        *self.published.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(health);
        self.registry.set_ready(true).await;
    }
}

/// Component verdict for an accepted snapshot
fn snapshot_check(snapshot: &Snapshot, at: chrono::DateTime<chrono::Utc>) -> HealthCheckResult {
    let component = snapshot.kind().as_str();
    match snapshot {
        Snapshot::Host(m) => HealthCheckResult::healthy(
            component,
            format!(
                "CPU {:.1}%, RAM {:.1}%, SSD {:.1}%",
                m.cpu_usage * 100.0,
                m.ram_usage * 100.0,
                m.ssd_usage * 100.0
            ),
            at,
        ),
        Snapshot::Docker(status) if !status.is_daemon_running => {
            HealthCheckResult::unhealthy(component, "Docker daemon is not running", at)
        }
        Snapshot::Docker(status) => {
            let running = status.containers.iter().filter(|c| c.is_running).count();
            HealthCheckResult::healthy(
                component,
                format!("Docker daemon running, {}/{} containers up", running, status.containers.len()),
                at,
            )
            .with_detail("containers", status.containers.len() as i64)
            .with_detail("running", running as i64)
        }
        Snapshot::Runners(runners) => {
            let online = runners.iter().filter(|r| r.is_online).count();
            let message = format!("{}/{} runners online", online, runners.len());
            let check = if online == runners.len() {
                HealthCheckResult::healthy(component, message, at)
            } else {
                HealthCheckResult::unhealthy(component, message, at)
            };
            check
                .with_detail("total", runners.len() as i64)
                .with_detail("online", online as i64)
        }
    }
}
