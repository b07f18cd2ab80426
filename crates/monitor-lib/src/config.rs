//! Monitoring settings
//!
//! Every field has a default so a partial file or environment overlay is
//! enough to configure the monitor. The daemon loads these through the
//! `config` crate; tests build them directly.

use crate::models::{AlertType, CollectorKind};
use anyhow::{bail, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// Top-level monitoring settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub collectors: CollectorsSettings,
    pub thresholds: Thresholds,
    /// Number of open alerts surfaced in SystemHealth
    pub alert_retention: usize,
    pub notifications: NotificationSettings,
    pub docker: DockerSettings,
    pub github: GitHubSettings,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            collectors: CollectorsSettings::default(),
            thresholds: Thresholds::default(),
            alert_retention: 10,
            notifications: NotificationSettings::default(),
            docker: DockerSettings::default(),
            github: GitHubSettings::default(),
        }
    }
}

impl MonitorSettings {
    /// Reject settings that would make evaluation meaningless
    pub fn validate(&self) -> Result<()> {
        for (name, band) in [
            ("cpu", &self.thresholds.cpu),
            ("ram", &self.thresholds.ram),
            ("ssd", &self.thresholds.ssd),
        ] {
            if !(0.0..=1.0).contains(&band.warning) || !(0.0..=1.0).contains(&band.critical) {
                bail!("{} thresholds must be ratios in [0, 1]", name);
            }
            if band.warning >= band.critical {
                bail!(
                    "{} warning threshold {} must be below critical threshold {}",
                    name,
                    band.warning,
                    band.critical
                );
            }
        }

        let battery = &self.thresholds.battery;
        if battery.critical >= battery.warning || battery.warning > 100 {
            bail!(
                "battery thresholds must satisfy critical < warning <= 100 (got {} / {})",
                battery.critical,
                battery.warning
            );
        }

        for kind in CollectorKind::ALL {
            let schedule = self.collectors.schedule(kind);
            if schedule.interval_secs == 0 || schedule.timeout_secs == 0 {
                bail!("{} collector interval and timeout must be non-zero", kind);
            }
        }

        if self.notifications.delivery_timeout_secs == 0 {
            bail!("notification delivery timeout must be non-zero");
        }

        Ok(())
    }
}

/// Per-collector cadence
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectorsSettings {
    pub host: CollectorSchedule,
    pub docker: CollectorSchedule,
    pub runners: CollectorSchedule,
}

impl Default for CollectorsSettings {
    fn default() -> Self {
        Self {
            host: CollectorSchedule::every(60),
            docker: CollectorSchedule::every(30),
            runners: CollectorSchedule::every(300),
        }
    }
}

impl CollectorsSettings {
    pub fn schedule(&self, kind: CollectorKind) -> &CollectorSchedule {
        match kind {
            CollectorKind::Host => &self.host,
            CollectorKind::Docker => &self.docker,
            CollectorKind::Runners => &self.runners,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectorSchedule {
    pub enabled: bool,
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl CollectorSchedule {
    pub fn every(interval_secs: u64) -> Self {
        Self {
            enabled: true,
            interval_secs,
            timeout_secs: 10,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CollectorSchedule {
    fn default() -> Self {
        Self::every(60)
    }
}

/// WARNING/CRITICAL bounds for a usage ratio; a value strictly above a bound trips it
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct UsageBand {
    pub warning: f64,
    pub critical: f64,
}

impl Default for UsageBand {
    fn default() -> Self {
        Self {
            warning: 0.85,
            critical: 0.95,
        }
    }
}

/// Battery bounds in percent; a level strictly below a bound trips it
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct BatteryBand {
    pub warning: u8,
    pub critical: u8,
}

impl Default for BatteryBand {
    fn default() -> Self {
        Self {
            warning: 20,
            critical: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub cpu: UsageBand,
    pub ram: UsageBand,
    pub ssd: UsageBand,
    pub battery: BatteryBand,
    /// Restart-count increase between two samples above which a container is restart-looping
    pub restart_burst: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu: UsageBand::default(),
            ram: UsageBand::default(),
            ssd: UsageBand::default(),
            battery: BatteryBand::default(),
            restart_burst: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
    /// Alert types that are never forwarded to the sink
    pub suppressed_types: HashSet<AlertType>,
    /// Minimum gap between two "raised" notifications for the same alert key
    pub renotify_cooldown_secs: u64,
    pub delivery_timeout_secs: u64,
    pub slack: SlackSettings,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            suppressed_types: HashSet::new(),
            renotify_cooldown_secs: 300,
            delivery_timeout_secs: 10,
            slack: SlackSettings::default(),
        }
    }
}

impl NotificationSettings {
    pub fn renotify_cooldown(&self) -> Duration {
        Duration::from_secs(self.renotify_cooldown_secs)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SlackSettings {
    pub webhook_url: String,
    pub channel: String,
    pub username: String,
}

impl Default for SlackSettings {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            channel: String::new(),
            username: "Fleet Monitor".to_string(),
        }
    }
}

impl SlackSettings {
    pub fn is_configured(&self) -> bool {
        !self.webhook_url.trim().is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DockerSettings {
    /// Path or name of the docker CLI
    pub binary: String,
    /// Container names to watch; empty watches every container
    pub monitored_containers: Vec<String>,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            monitored_containers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubSettings {
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub api_base: String,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            token: String::new(),
            owner: String::new(),
            repo: String::new(),
            api_base: "https://api.github.com".to_string(),
        }
    }
}

impl GitHubSettings {
    pub fn is_configured(&self) -> bool {
        !self.token.is_empty() && !self.owner.is_empty() && !self.repo.is_empty()
    }
}
