//! Component health tracking for the fleet monitor
//!
//! Holds the latest `HealthCheckResult` per component (one per registered
//! collector) and the readiness flag behind the liveness and readiness endpoints.

use crate::models::HealthCheckResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of the monitor's components as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Every component reported healthy
    Healthy,
    /// Some components are failing, the rest still report
    Degraded,
    /// Every component is failing
    Unhealthy,
}

/// Liveness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, HealthCheckResult>,
}

impl HealthResponse {
    pub fn compute_status(components: &BTreeMap<String, HealthCheckResult>) -> ComponentStatus {
        let failing = components.values().filter(|c| !c.is_healthy).count();
        match failing {
            0 => ComponentStatus::Healthy,
            n if n == components.len() => ComponentStatus::Unhealthy,
            _ => ComponentStatus::Degraded,
        }
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Health registry for tracking component verdicts
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<String, HealthCheckResult>>>,
    ready: Arc<RwLock<bool>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(BTreeMap::new())),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    /// Replace the verdict for `result.component`
    pub async fn update(&self, result: HealthCheckResult) {
        let mut components = self.components.write().await;
        components.insert(result.component.clone(), result);
    }

    pub async fn get(&self, component: &str) -> Option<HealthCheckResult> {
        self.components.read().await.get(component).cloned()
    }

    /// Latest verdicts ordered by component name
    pub async fn checks(&self) -> Vec<HealthCheckResult> {
        self.components.read().await.values().cloned().collect()
    }

    /// Set readiness status
    pub async fn set_ready(&self, ready: bool) {
        let mut r = self.ready.write().await;
        *r = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    /// Ready once the first aggregation has been published. Failing collectors
    /// do not affect readiness: they are reported through the health view.
    pub async fn readiness(&self) -> ReadinessResponse {
        if *self.ready.read().await {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        } else {
            ReadinessResponse {
                ready: false,
                reason: Some("No health aggregation published yet".to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn check(component: &str, healthy: bool) -> HealthCheckResult {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        if healthy {
            HealthCheckResult::healthy(component, "ok", ts)
        } else {
            HealthCheckResult::unhealthy(component, "poll timed out", ts)
        }
    }

    #[tokio::test]
    async fn test_health_registry_initial_state() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_verdict() {
        let registry = HealthRegistry::new();
        registry.update(check("docker", false)).await;
        registry.update(check("docker", true)).await;

        let checks = registry.checks().await;
        assert_eq!(checks.len(), 1);
        assert!(checks[0].is_healthy);
    }

    #[tokio::test]
    async fn test_degraded_and_unhealthy_status() {
        let registry = HealthRegistry::new();
        registry.update(check("host", true)).await;
        registry.update(check("docker", false)).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry.update(check("host", false)).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_checks_are_ordered_by_component() {
        let registry = HealthRegistry::new();
        registry.update(check("runners", true)).await;
        registry.update(check("docker", true)).await;
        registry.update(check("host", true)).await;

        let names: Vec<String> = registry
            .checks()
            .await
            .into_iter()
            .map(|c| c.component)
            .collect();
        assert_eq!(names, vec!["docker", "host", "runners"]);
    }

    #[tokio::test]
    async fn test_readiness_not_ready_initially() {
        let registry = HealthRegistry::new();
        let readiness = registry.readiness().await;

        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());
    }

    #[tokio::test]
    async fn test_readiness_ignores_failing_components() {
        let registry = HealthRegistry::new();
        registry.update(check("host", false)).await;
        registry.set_ready(true).await;

        assert!(registry.readiness().await.ready);
    }
}
