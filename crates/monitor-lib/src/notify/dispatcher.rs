//! Suppression policy and the delivery task

use super::NotificationSink;
use crate::alert::{AlertTransition, TransitionKind};
use crate::clock::Clock;
use crate::config::NotificationSettings;
use crate::error::DeliveryError;
use crate::models::{AlertKey, AlertType};
use crate::observability::{MonitorMetrics, StructuredLogger};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info};

/// How often raises held back by the cooldown are re-checked
const DEFERRED_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Why a transition was not forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Refreshes of an open alert are never forwarded
    Update,
    Disabled,
    SuppressedType,
    /// Same key was notified as raised within the renotify cooldown. The
    /// raise is held and delivered once the cooldown elapses.
    Cooldown,
    /// The matching raise was not forwarded
    UnnotifiedResolve,
}

/// Decides which transitions reach the sink
#[derive(Debug)]
pub struct NotificationPolicy {
    enabled: bool,
    suppressed_types: HashSet<AlertType>,
    cooldown: chrono::Duration,
    last_raised: HashMap<AlertKey, DateTime<Utc>>,
    forwarded_open: HashSet<AlertKey>,
    /// Raises held back by the cooldown whose alert is still open
    deferred: HashMap<AlertKey, AlertTransition>,
}

impl NotificationPolicy {
    pub fn new(settings: &NotificationSettings) -> Self {
        Self {
            enabled: settings.enabled,
            suppressed_types: settings.suppressed_types.clone(),
            cooldown: chrono::Duration::from_std(settings.renotify_cooldown())
                .unwrap_or_else(|_| chrono::Duration::zero()),
            last_raised: HashMap::new(),
            forwarded_open: HashSet::new(),
            deferred: HashMap::new(),
        }
    }

    /// `Ok(())` when the transition should be delivered
    pub fn decide(&mut self, transition: &AlertTransition) -> Result<(), SuppressReason> {
        let key = transition.alert.key();
        match transition.kind {
            TransitionKind::Updated => {
                // A held raise goes out with the alert's latest state
                if let Some(held) = self.deferred.get_mut(&key) {
                    held.alert = transition.alert.clone();
                }
                Err(SuppressReason::Update)
            }
            TransitionKind::Raised => {
                if !self.enabled {
                    return Err(SuppressReason::Disabled);
                }
                if self.suppressed_types.contains(&key.alert_type) {
                    return Err(SuppressReason::SuppressedType);
                }

                let at = transition.at;
                let cooldown = self.cooldown;
                self.last_raised.retain(|_, last| at - *last < cooldown);
                if self.last_raised.contains_key(&key) {
                    self.deferred.insert(key, transition.clone());
                    return Err(SuppressReason::Cooldown);
                }

                self.last_raised.insert(key.clone(), at);
                self.forwarded_open.insert(key);
                Ok(())
            }
            TransitionKind::Resolved => {
                // Resolved inside the cooldown: the held raise is dropped with it
                self.deferred.remove(&key);
                if self.forwarded_open.remove(&key) {
                    Ok(())
                } else {
                    Err(SuppressReason::UnnotifiedResolve)
                }
            }
        }
    }

    /// Held raises whose cooldown has elapsed by `now`, ordered by key. Each
    /// one is recorded as forwarded.
    pub fn release_due(&mut self, now: DateTime<Utc>) -> Vec<AlertTransition> {
        let cooldown = self.cooldown;
        let mut due: Vec<AlertKey> = self
            .deferred
            .keys()
            .filter(|key| {
                self.last_raised
                    .get(*key)
                    .map_or(true, |last| now - *last >= cooldown)
            })
            .cloned()
            .collect();
        due.sort();

        due.into_iter()
            .filter_map(|key| {
                let mut held = self.deferred.remove(&key)?;
                held.at = now;
                self.last_raised.insert(key.clone(), now);
                self.forwarded_open.insert(key);
                Some(held)
            })
            .collect()
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }
}

/// Forwards transitions to a sink, one at a time and in arrival order
pub struct Dispatcher {
    sink: Arc<dyn NotificationSink>,
    policy: NotificationPolicy,
    delivery_timeout: Duration,
    clock: Arc<dyn Clock>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl Dispatcher {
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        settings: &NotificationSettings,
        clock: Arc<dyn Clock>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            sink,
            policy: NotificationPolicy::new(settings),
            delivery_timeout: settings.delivery_timeout(),
            clock,
            metrics: MonitorMetrics::new(),
            logger,
        }
    }

    /// Apply the policy and deliver. Returns whether the sink accepted it.
    pub async fn dispatch(&mut self, transition: &AlertTransition) -> bool {
        if let Err(reason) = self.policy.decide(transition) {
            if reason != SuppressReason::Update {
                self.metrics.inc_notifications_suppressed();
                debug!(
                    alert_id = %transition.alert.id,
                    kind = %transition.kind,
                    reason = ?reason,
                    "Notification suppressed"
                );
            }
            return false;
        }

        self.deliver(transition).await
    }

    /// Deliver raises held by the cooldown once it has elapsed
    pub async fn flush_deferred(&mut self) -> usize {
        if !self.policy.has_deferred() {
            return 0;
        }
        let due = self.policy.release_due(self.clock.now());
        for transition in &due {
            debug!(alert_id = %transition.alert.id, "Releasing raise held by cooldown");
            self.deliver(transition).await;
        }
        due.len()
    }

    async fn deliver(&self, transition: &AlertTransition) -> bool {
        let result = match timeout(self.delivery_timeout, self.sink.send(transition)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(self.delivery_timeout)),
        };

        match result {
            Ok(()) => {
                self.metrics.inc_notifications_sent();
                true
            }
            Err(e) => {
                self.metrics.inc_notifications_failed();
                self.logger
                    .log_delivery_failure(self.sink.name(), &transition.alert.id, &e.to_string());
                false
            }
        }
    }

    /// Drain transitions until every sender is dropped. Held raises are
    /// checked on a timer so an alert that stays open is still announced.
    pub async fn run(mut self, mut rx: mpsc::Receiver<AlertTransition>) {
        info!(sink = %self.sink.name(), "Starting notification dispatcher");
        let mut ticker = interval(DEFERRED_CHECK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(transition) => {
                        self.dispatch(&transition).await;
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    self.flush_deferred().await;
                }
            }
        }
        info!(sink = %self.sink.name(), "Notification dispatcher stopped");
    }
}
