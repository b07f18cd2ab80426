//! Last-sample cache for every registered collector
//!
//! Snapshots are held behind `Arc` and replaced wholesale, so readers always
//! see a complete snapshot and an abandoned poll can never leave a partial one.

use crate::aggregator::{AggregationInput, CollectorView};
use crate::models::{CollectorKind, HealthCheckResult, Snapshot};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Collection state of one collector
#[derive(Debug, Clone, Default)]
pub struct CollectorState {
    /// Latest accepted snapshot
    pub latest: Option<Arc<Snapshot>>,
    /// Accepted snapshot before `latest`
    pub previous: Option<Arc<Snapshot>>,
    /// Failure reason of the most recent poll, cleared by the next success
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl CollectorState {
    pub fn is_stale(&self) -> bool {
        self.last_error.is_some()
    }

    pub fn has_succeeded(&self) -> bool {
        self.latest.is_some()
    }
}

/// Latest accepted snapshot of one collector with its predecessor
#[derive(Debug, Clone)]
pub struct AcceptedSnapshot {
    pub latest: Arc<Snapshot>,
    pub previous: Option<Arc<Snapshot>>,
    /// When `latest` was accepted
    pub observed_at: DateTime<Utc>,
}

/// Registry of collector states keyed by family
#[derive(Debug, Default)]
pub struct SnapshotStore {
    collectors: DashMap<CollectorKind, CollectorState>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collector; unregistered families do not take part in aggregation
    pub fn register(&self, kind: CollectorKind) {
        debug!(collector = %kind, "Registering collector");
        self.collectors.entry(kind).or_default();
    }

    /// Registered families in a stable order
    pub fn registered(&self) -> Vec<CollectorKind> {
        let mut kinds: Vec<CollectorKind> = self.collectors.iter().map(|r| *r.key()).collect();
        kinds.sort();
        kinds
    }

    pub fn record_success(&self, snapshot: Snapshot, at: DateTime<Utc>) {
        let mut state = self.collectors.entry(snapshot.kind()).or_default();
        state.previous = state.latest.take();
        state.latest = Some(Arc::new(snapshot));
        state.last_error = None;
        state.consecutive_failures = 0;
        state.last_poll_at = Some(at);
        state.last_success_at = Some(at);
    }

    /// Mark a collector stale; its last accepted snapshot is kept
    pub fn record_failure(&self, kind: CollectorKind, reason: impl Into<String>, at: DateTime<Utc>) {
        let mut state = self.collectors.entry(kind).or_default();
        state.last_error = Some(reason.into());
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_poll_at = Some(at);
    }

    pub fn state(&self, kind: CollectorKind) -> Option<CollectorState> {
        self.collectors.get(&kind).map(|r| r.value().clone())
    }

    /// Every collector with an accepted snapshot, in family order
    pub fn snapshots(&self) -> Vec<AcceptedSnapshot> {
        self.registered()
            .into_iter()
            .filter_map(|kind| self.state(kind))
            .filter_map(|state| {
                Some(AcceptedSnapshot {
                    latest: state.latest?,
                    previous: state.previous,
                    observed_at: state.last_success_at?,
                })
            })
            .collect()
    }

    pub fn views(&self) -> Vec<CollectorView> {
        self.registered()
            .into_iter()
            .filter_map(|kind| {
                self.state(kind).map(|state| CollectorView {
                    kind,
                    has_succeeded: state.has_succeeded(),
                    stale: state.is_stale(),
                })
            })
            .collect()
    }

    /// Copy out everything the aggregator needs
    pub fn aggregation_input(&self, checks: Vec<HealthCheckResult>) -> AggregationInput {
        let mut input = AggregationInput {
            collectors: self.views(),
            checks,
            ..Default::default()
        };

        for accepted in self.snapshots() {
            match accepted.latest.as_ref() {
                Snapshot::Host(metrics) => input.system = Some(metrics.clone()),
                Snapshot::Docker(status) => input.docker = Some(status.clone()),
                Snapshot::Runners(runners) => input.runners = runners.clone(),
            }
        }

        input
    }
}
