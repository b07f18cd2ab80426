//! Open-alert set and per-cycle lifecycle transitions

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AlertNotFound;
use crate::evaluator::CandidateAlert;
use crate::models::{Alert, AlertKey, AlertLevel, AlertType};

/// Lifecycle transition kinds emitted by an engine pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Raised,
    Updated,
    Resolved,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Raised => "raised",
            TransitionKind::Updated => "updated",
            TransitionKind::Resolved => "resolved",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed change to the open-alert set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertTransition {
    pub kind: TransitionKind,
    /// Alert state after the transition (last known state for `Resolved`)
    pub alert: Alert,
    pub at: DateTime<Utc>,
}

/// Filter for listing open alerts
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AlertFilter {
    pub level: Option<AlertLevel>,
    #[serde(rename = "type")]
    pub alert_type: Option<AlertType>,
    pub acknowledged_only: bool,
}

impl AlertFilter {
    pub fn matches(&self, alert: &Alert) -> bool {
        self.level.map_or(true, |level| alert.level == level)
            && self.alert_type.map_or(true, |t| alert.alert_type == t)
            && (!self.acknowledged_only || alert.acknowledged)
    }
}

/// Deterministic alert id derived from the alert key
pub fn alert_id(key: &AlertKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.alert_type.as_str().as_bytes());
    hasher.update(b"\x1f");
    hasher.update(key.subject.to_string().as_bytes());
    hex::encode(&hasher.finalize()[..12])
}

/// Owner of the open-alert set.
///
/// Keyed strictly on (type, subject), so the outcome of a pass does not
/// depend on the order candidates arrive in.
#[derive(Debug, Default)]
pub struct AlertEngine {
    open: BTreeMap<AlertKey, Alert>,
}

impl AlertEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one update pass with every candidate produced this cycle.
    ///
    /// Transitions are returned ordered by alert key.
    pub fn apply(
        &mut self,
        candidates: impl IntoIterator<Item = CandidateAlert>,
        now: DateTime<Utc>,
    ) -> Vec<AlertTransition> {
        let incoming = merge_candidates(candidates);
        let mut transitions = Vec::new();

        let gone: Vec<AlertKey> = self
            .open
            .keys()
            .filter(|key| !incoming.contains_key(*key))
            .cloned()
            .collect();
        for key in gone {
            if let Some(alert) = self.open.remove(&key) {
                transitions.push(AlertTransition {
                    kind: TransitionKind::Resolved,
                    alert,
                    at: now,
                });
            }
        }

        for (key, candidate) in incoming {
            let observed = candidate.observed_at.unwrap_or(now);
            match self.open.entry(key) {
                Entry::Occupied(mut entry) => {
                    let alert = entry.get_mut();
                    let changed = alert.level != candidate.level
                        || alert.message != candidate.message
                        || alert.details != candidate.details;

                    alert.level = candidate.level;
                    alert.message = candidate.message;
                    alert.details = candidate.details;
                    // Re-evaluating an older snapshot never moves it back
                    alert.timestamp = alert.timestamp.max(observed);

                    if changed {
                        transitions.push(AlertTransition {
                            kind: TransitionKind::Updated,
                            alert: alert.clone(),
                            at: now,
                        });
                    }
                }
                Entry::Vacant(entry) => {
                    let alert = Alert {
                        id: alert_id(entry.key()),
                        alert_type: candidate.alert_type,
                        subject: candidate.subject,
                        level: candidate.level,
                        message: candidate.message,
                        details: candidate.details,
                        raised_at: observed,
                        timestamp: observed,
                        acknowledged: false,
                    };
                    transitions.push(AlertTransition {
                        kind: TransitionKind::Raised,
                        alert: alert.clone(),
                        at: now,
                    });
                    entry.insert(alert);
                }
            }
        }

        transitions.sort_by(|a, b| a.alert.key().cmp(&b.alert.key()));
        transitions
    }

    /// Mark an open alert as acknowledged
    pub fn acknowledge(&mut self, alert_id: &str) -> Result<Alert, AlertNotFound> {
        self.open
            .values_mut()
            .find(|alert| alert.id == alert_id)
            .map(|alert| {
                alert.acknowledged = true;
                alert.clone()
            })
            .ok_or_else(|| AlertNotFound(alert_id.to_string()))
    }

    /// Copy of the open set, ordered by key
    pub fn open_alerts(&self) -> Vec<Alert> {
        self.open.values().cloned().collect()
    }

    pub fn list(&self, filter: &AlertFilter) -> Vec<Alert> {
        self.open
            .values()
            .filter(|alert| filter.matches(alert))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

/// Collapse candidates sharing a key; the most severe one wins, ties broken on message
fn merge_candidates(
    candidates: impl IntoIterator<Item = CandidateAlert>,
) -> BTreeMap<AlertKey, CandidateAlert> {
    let mut merged: BTreeMap<AlertKey, CandidateAlert> = BTreeMap::new();
    for candidate in candidates {
        match merged.entry(candidate.key()) {
            Entry::Vacant(entry) => {
                entry.insert(candidate);
            }
            Entry::Occupied(mut entry) => {
                let current = entry.get();
                if (candidate.level, &candidate.message) > (current.level, &current.message) {
                    entry.insert(candidate);
                }
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertSubject, DetailValue};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn container_down(id: &str) -> CandidateAlert {
        CandidateAlert::new(
            AlertType::ContainerDown,
            AlertSubject::Container(id.to_string()),
            AlertLevel::Critical,
            format!("Container '{}' is down", id),
        )
        .with_detail("containerId", id)
    }

    fn cpu(value: f64, level: AlertLevel) -> CandidateAlert {
        CandidateAlert::new(
            AlertType::CpuHigh,
            AlertSubject::Host,
            level,
            format!("CPU usage {:.1}%", value * 100.0),
        )
        .with_detail("value", value)
    }

    #[test]
    fn test_raise_then_resolve() {
        let mut engine = AlertEngine::new();

        let transitions = engine.apply(vec![cpu(0.92, AlertLevel::Warning)], t0());
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].kind, TransitionKind::Raised);
        assert_eq!(transitions[0].alert.level, AlertLevel::Warning);
        assert_eq!(engine.len(), 1);

        let transitions = engine.apply(Vec::new(), t0() + Duration::seconds(60));
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].kind, TransitionKind::Resolved);
        assert!(engine.is_empty());
    }

    #[test]
    fn test_identity_stable_across_cycles() {
        let mut engine = AlertEngine::new();
        let first = engine.apply(vec![container_down("abc")], t0());
        let id = first[0].alert.id.clone();

        let second = engine.apply(vec![container_down("abc")], t0() + Duration::seconds(30));
        // Unchanged repeat: no transition, identity preserved, timestamp refreshed
        assert!(second.is_empty());
        let open = engine.open_alerts();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, id);
        assert_eq!(open[0].raised_at, t0());
        assert_eq!(open[0].timestamp, t0() + Duration::seconds(30));
    }

    #[test]
    fn test_timestamp_follows_observation_not_pass() {
        let mut engine = AlertEngine::new();
        let seen = t0() + Duration::seconds(30);

        engine.apply(vec![container_down("abc").observed_at(seen)], seen);
        // Same stale observation re-evaluated on later passes
        for minute in 1..=4 {
            let later = seen + Duration::minutes(minute);
            engine.apply(vec![container_down("abc").observed_at(seen)], later);
        }

        let open = engine.open_alerts();
        assert_eq!(open[0].raised_at, seen);
        assert_eq!(open[0].timestamp, seen);

        let fresh = seen + Duration::minutes(5);
        engine.apply(vec![container_down("abc").observed_at(fresh)], fresh);
        assert_eq!(engine.open_alerts()[0].timestamp, fresh);
    }

    #[test]
    fn test_material_change_emits_update() {
        let mut engine = AlertEngine::new();
        engine.apply(vec![cpu(0.90, AlertLevel::Warning)], t0());

        let transitions = engine.apply(vec![cpu(0.97, AlertLevel::Critical)], t0());
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].kind, TransitionKind::Updated);
        assert_eq!(transitions[0].alert.level, AlertLevel::Critical);
        assert_eq!(
            transitions[0].alert.details["value"],
            DetailValue::Float(0.97)
        );
    }

    #[test]
    fn test_at_most_one_open_per_key() {
        let mut engine = AlertEngine::new();
        let transitions = engine.apply(
            vec![
                container_down("abc"),
                container_down("abc"),
                container_down("def"),
            ],
            t0(),
        );
        assert_eq!(transitions.len(), 2);
        assert_eq!(engine.len(), 2);

        let mut keys: Vec<_> = engine.open_alerts().iter().map(|a| a.key()).collect();
        keys.dedup();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_duplicate_candidates_keep_most_severe() {
        let mut engine = AlertEngine::new();
        engine.apply(
            vec![cpu(0.9, AlertLevel::Warning), cpu(0.97, AlertLevel::Critical)],
            t0(),
        );
        assert_eq!(engine.open_alerts()[0].level, AlertLevel::Critical);
    }

    #[test]
    fn test_order_independent() {
        let candidates = vec![
            container_down("c"),
            cpu(0.9, AlertLevel::Warning),
            container_down("a"),
            container_down("b"),
        ];
        let mut reversed = candidates.clone();
        reversed.reverse();

        let mut left = AlertEngine::new();
        let mut right = AlertEngine::new();
        let lt = left.apply(candidates, t0());
        let rt = right.apply(reversed, t0());

        assert_eq!(lt, rt);
        assert_eq!(left.open_alerts(), right.open_alerts());
    }

    #[test]
    fn test_acknowledge_survives_update() {
        let mut engine = AlertEngine::new();
        let raised = engine.apply(vec![cpu(0.90, AlertLevel::Warning)], t0());
        let id = raised[0].alert.id.clone();

        let acked = engine.acknowledge(&id).unwrap();
        assert!(acked.acknowledged);

        let updated = engine.apply(vec![cpu(0.93, AlertLevel::Warning)], t0());
        assert_eq!(updated[0].kind, TransitionKind::Updated);
        assert!(updated[0].alert.acknowledged);
        assert_eq!(updated[0].alert.id, id);
    }

    #[test]
    fn test_acknowledge_unknown_or_resolved_fails() {
        let mut engine = AlertEngine::new();
        assert_eq!(
            engine.acknowledge("missing"),
            Err(AlertNotFound("missing".to_string()))
        );

        let raised = engine.apply(vec![container_down("abc")], t0());
        let id = raised[0].alert.id.clone();
        engine.apply(Vec::new(), t0());
        assert!(engine.acknowledge(&id).is_err());
    }

    #[test]
    fn test_reraise_starts_unacknowledged() {
        let mut engine = AlertEngine::new();
        let raised = engine.apply(vec![container_down("abc")], t0());
        engine.acknowledge(&raised[0].alert.id).unwrap();
        engine.apply(Vec::new(), t0());

        let again = engine.apply(vec![container_down("abc")], t0());
        assert_eq!(again[0].kind, TransitionKind::Raised);
        assert!(!again[0].alert.acknowledged);
    }

    #[test]
    fn test_list_with_filter() {
        let mut engine = AlertEngine::new();
        let transitions = engine.apply(
            vec![container_down("abc"), cpu(0.9, AlertLevel::Warning)],
            t0(),
        );
        let cpu_id = transitions
            .iter()
            .find(|t| t.alert.alert_type == AlertType::CpuHigh)
            .map(|t| t.alert.id.clone())
            .unwrap();
        engine.acknowledge(&cpu_id).unwrap();

        let critical = engine.list(&AlertFilter {
            level: Some(AlertLevel::Critical),
            ..Default::default()
        });
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].alert_type, AlertType::ContainerDown);

        let acked = engine.list(&AlertFilter {
            acknowledged_only: true,
            ..Default::default()
        });
        assert_eq!(acked.len(), 1);
        assert_eq!(acked[0].id, cpu_id);

        let by_type = engine.list(&AlertFilter {
            alert_type: Some(AlertType::GithubRunnerOffline),
            ..Default::default()
        });
        assert!(by_type.is_empty());
    }

    #[test]
    fn test_alert_id_distinguishes_subjects() {
        let a = alert_id(&AlertKey::new(
            AlertType::ContainerDown,
            AlertSubject::Container("a".into()),
        ));
        let b = alert_id(&AlertKey::new(
            AlertType::ContainerDown,
            AlertSubject::Container("b".into()),
        ));
        let restart = alert_id(&AlertKey::new(
            AlertType::ContainerRestarting,
            AlertSubject::Container("a".into()),
        ));
        assert_ne!(a, b);
        assert_ne!(a, restart);
        assert_eq!(a.len(), 24);
    }
}
