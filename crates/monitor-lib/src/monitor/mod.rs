//! Lifecycle-scoped monitoring state and its query surface
//!
//! `MonitorState` owns everything the monitor knows: the snapshot store, the
//! alert engine, standing application-error conditions and the last
//! published `SystemHealth`. It is created by `MonitorRuntime::start` and
//! handed out by `Arc`; there is no process-global monitoring state.

mod pipeline;
mod runtime;


pub use pipeline::run_pipeline;
pub use runtime::{build_sink, build_sources, MonitorRuntime};

use crate::alert::{AlertEngine, AlertFilter, AlertTransition};
use crate::clock::Clock;
use crate::collector::SnapshotStore;
use crate::config::MonitorSettings;
use crate::error::AlertNotFound;
use crate::evaluator::CandidateAlert;
use crate::health::HealthRegistry;
use crate::models::{Alert, AlertLevel, AlertSubject, AlertType, HealthCheckResult, SystemHealth};
use crate::observability::{MonitorMetrics, StructuredLogger};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Application-asserted error condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationErrorReport {
    pub subject: String,
    pub level: AlertLevel,
    pub message: String,
}

impl ApplicationErrorReport {
    fn to_candidate(&self) -> CandidateAlert {
        CandidateAlert::new(
            AlertType::ApplicationError,
            AlertSubject::Application(self.subject.clone()),
            self.level,
            self.message.clone(),
        )
    }
}

pub struct MonitorState {
    settings: MonitorSettings,
    clock: Arc<dyn Clock>,
    store: SnapshotStore,
    engine: tokio::sync::Mutex<AlertEngine>,
    published: RwLock<Arc<SystemHealth>>,
    application_errors: Mutex<BTreeMap<String, ApplicationErrorReport>>,
    registry: HealthRegistry,
    notifications: Mutex<Option<mpsc::Sender<AlertTransition>>>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl MonitorState {
    pub fn new(
        settings: MonitorSettings,
        clock: Arc<dyn Clock>,
        logger: StructuredLogger,
        notifications: mpsc::Sender<AlertTransition>,
    ) -> Self {
        let initial = SystemHealth::unknown(clock.now());
        Self {
            settings,
            clock,
            store: SnapshotStore::new(),
            engine: tokio::sync::Mutex::new(AlertEngine::new()),
            published: RwLock::new(Arc::new(initial)),
            application_errors: Mutex::new(BTreeMap::new()),
            registry: HealthRegistry::new(),
            notifications: Mutex::new(Some(notifications)),
            metrics: MonitorMetrics::new(),
            logger,
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn registry(&self) -> &HealthRegistry {
        &self.registry
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Last aggregated view. Never triggers a poll and never waits on the
    /// alert engine.
    pub fn current_health(&self) -> Arc<SystemHealth> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub async fn list_alerts(&self, filter: &AlertFilter) -> Vec<Alert> {
        self.engine.lock().await.list(filter)
    }

    /// Latest verdict per registered collector
    pub async fn checks(&self) -> Vec<HealthCheckResult> {
        self.registry.checks().await
    }

    pub async fn acknowledge(&self, alert_id: &str) -> Result<Alert, AlertNotFound> {
        let mut engine = self.engine.lock().await;
        let alert = engine.acknowledge(alert_id)?;
        info!(alert_id = %alert.id, alert_type = %alert.alert_type, "Alert acknowledged");

        // Republish so the health view carries the flag
        self.publish(&engine).await;
        Ok(alert)
    }

    /// Register or replace a standing application error and re-evaluate
    pub async fn report_application_error(&self, report: ApplicationErrorReport) -> Vec<AlertTransition> {
        debug!(subject = %report.subject, level = %report.level, "Application error reported");
        self.application_errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(report.subject.clone(), report);
        self.reevaluate().await
    }

    /// Remove a standing application error. Returns `None` when no condition
    /// was registered under `subject`.
    pub async fn clear_application_error(&self, subject: &str) -> Option<Vec<AlertTransition>> {
        let removed = self
            .application_errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(subject);
        match removed {
            Some(_) => Some(self.reevaluate().await),
            None => None,
        }
    }

    fn application_candidates(&self) -> Vec<CandidateAlert> {
        self.application_errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(ApplicationErrorReport::to_candidate)
            .collect()
    }

    /// Hand a transition to the dispatcher without waiting on it
    fn forward(&self, transition: AlertTransition) {
        let guard = self.notifications.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = guard.as_ref() else {
            return;
        };
        if let Err(e) = tx.try_send(transition) {
            self.metrics.inc_notifications_failed();
            warn!(error = %e, "Notification queue unavailable, dropping transition");
        }
    }

    /// Stop forwarding; the dispatcher drains what is queued and exits
    pub fn close_notifications(&self) {
        self.notifications
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }
}
