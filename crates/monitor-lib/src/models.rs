//! Core data models for the fleet monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Point-in-time host resource sample. Ratios are in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_usage: f64,
    pub ram_usage: f64,
    pub ram_total: u64,
    pub ram_used: u64,
    pub ssd_usage: f64,
    pub ssd_total: u64,
    pub ssd_used: u64,
    /// Battery charge 0-100, absent on hosts without a battery
    pub battery_level: Option<u8>,
    pub is_power_connected: Option<bool>,
    pub timestamp: DateTime<Utc>,
}

/// State of one container at sample time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    pub id: String,
    pub state: String,
    pub status: String,
    pub is_running: bool,
    pub is_restarting: bool,
    /// Monotonic restart counter reported by the runtime
    pub restart_count: u32,
    pub timestamp: DateTime<Utc>,
}

/// Container runtime state for one poll cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockerStatus {
    pub is_daemon_running: bool,
    pub containers: Vec<ContainerStatus>,
    pub timestamp: DateTime<Utc>,
}

impl DockerStatus {
    /// Status reported when the daemon cannot be reached
    pub fn daemon_down(timestamp: DateTime<Utc>) -> Self {
        Self {
            is_daemon_running: false,
            containers: Vec::new(),
            timestamp,
        }
    }

    pub fn container(&self, id: &str) -> Option<&ContainerStatus> {
        self.containers.iter().find(|c| c.id == id)
    }
}

/// One registered CI runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubRunnerStatus {
    pub id: u64,
    pub name: String,
    pub status: String,
    pub is_online: bool,
    pub is_busy: bool,
    pub labels: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Signal families, one collector each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectorKind {
    Host,
    Docker,
    Runners,
}

impl CollectorKind {
    pub const ALL: [CollectorKind; 3] = [
        CollectorKind::Host,
        CollectorKind::Docker,
        CollectorKind::Runners,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectorKind::Host => "host",
            CollectorKind::Docker => "docker",
            CollectorKind::Runners => "runners",
        }
    }
}

impl fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful result of one collector poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum Snapshot {
    Host(SystemMetrics),
    Docker(DockerStatus),
    Runners(Vec<GitHubRunnerStatus>),
}

impl Snapshot {
    pub fn kind(&self) -> CollectorKind {
        match self {
            Snapshot::Host(_) => CollectorKind::Host,
            Snapshot::Docker(_) => CollectorKind::Docker,
            Snapshot::Runners(_) => CollectorKind::Runners,
        }
    }
}

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Warning => "WARNING",
            AlertLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    CpuHigh,
    RamHigh,
    SsdHigh,
    BatteryLow,
    DockerDaemonDown,
    ContainerDown,
    ContainerRestarting,
    GithubRunnerOffline,
    ApplicationError,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::CpuHigh => "CPU_HIGH",
            AlertType::RamHigh => "RAM_HIGH",
            AlertType::SsdHigh => "SSD_HIGH",
            AlertType::BatteryLow => "BATTERY_LOW",
            AlertType::DockerDaemonDown => "DOCKER_DAEMON_DOWN",
            AlertType::ContainerDown => "CONTAINER_DOWN",
            AlertType::ContainerRestarting => "CONTAINER_RESTARTING",
            AlertType::GithubRunnerOffline => "GITHUB_RUNNER_OFFLINE",
            AlertType::ApplicationError => "APPLICATION_ERROR",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        [
            AlertType::CpuHigh,
            AlertType::RamHigh,
            AlertType::SsdHigh,
            AlertType::BatteryLow,
            AlertType::DockerDaemonDown,
            AlertType::ContainerDown,
            AlertType::ContainerRestarting,
            AlertType::GithubRunnerOffline,
            AlertType::ApplicationError,
        ]
        .into_iter()
        .find(|t| t.as_str() == normalized)
        .ok_or_else(|| format!("unknown alert type: {}", s))
    }
}

impl std::str::FromStr for AlertLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WARNING" => Ok(AlertLevel::Warning),
            "CRITICAL" => Ok(AlertLevel::Critical),
            _ => Err(format!("unknown alert level: {}", s)),
        }
    }
}

/// What an alert is about. Disambiguates multi-instance alert types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum AlertSubject {
    /// The monitored host itself (cpu/ram/ssd/battery)
    Host,
    /// The container runtime daemon singleton
    Daemon,
    Container(String),
    Runner(u64),
    Application(String),
}

impl fmt::Display for AlertSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSubject::Host => write!(f, "host"),
            AlertSubject::Daemon => write!(f, "daemon"),
            AlertSubject::Container(id) => write!(f, "container:{}", id),
            AlertSubject::Runner(id) => write!(f, "runner:{}", id),
            AlertSubject::Application(name) => write!(f, "application:{}", name),
        }
    }
}

/// Identity of an open alert: at most one open alert per key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlertKey {
    pub alert_type: AlertType,
    pub subject: AlertSubject,
}

impl AlertKey {
    pub fn new(alert_type: AlertType, subject: AlertSubject) -> Self {
        Self {
            alert_type,
            subject,
        }
    }
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.alert_type, self.subject)
    }
}

/// Scalar value in an alert's details map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for DetailValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetailValue::Bool(v) => write!(f, "{}", v),
            DetailValue::Int(v) => write!(f, "{}", v),
            DetailValue::Float(v) => write!(f, "{:.4}", v),
            DetailValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for DetailValue {
    fn from(v: bool) -> Self {
        DetailValue::Bool(v)
    }
}

impl From<i64> for DetailValue {
    fn from(v: i64) -> Self {
        DetailValue::Int(v)
    }
}

impl From<u32> for DetailValue {
    fn from(v: u32) -> Self {
        DetailValue::Int(i64::from(v))
    }
}

impl From<u8> for DetailValue {
    fn from(v: u8) -> Self {
        DetailValue::Int(i64::from(v))
    }
}

impl From<f64> for DetailValue {
    fn from(v: f64) -> Self {
        DetailValue::Float(v)
    }
}

impl From<&str> for DetailValue {
    fn from(v: &str) -> Self {
        DetailValue::Text(v.to_string())
    }
}

impl From<String> for DetailValue {
    fn from(v: String) -> Self {
        DetailValue::Text(v)
    }
}

pub type Details = BTreeMap<String, DetailValue>;

/// The unit of notifiable state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub subject: AlertSubject,
    pub level: AlertLevel,
    pub message: String,
    pub details: Details,
    /// First observation of the condition in this open episode
    pub raised_at: DateTime<Utc>,
    /// Last time the condition was observed true
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
}

impl Alert {
    pub fn key(&self) -> AlertKey {
        AlertKey::new(self.alert_type, self.subject.clone())
    }
}

/// Component-level health verdict, one per collector per cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub component: String,
    pub is_healthy: bool,
    pub message: String,
    pub details: Details,
    pub timestamp: DateTime<Utc>,
}

impl HealthCheckResult {
    pub fn healthy(
        component: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            component: component.into(),
            is_healthy: true,
            message: message.into(),
            details: Details::new(),
            timestamp,
        }
    }

    pub fn unhealthy(
        component: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            component: component.into(),
            is_healthy: false,
            message: message.into(),
            details: Details::new(),
            timestamp,
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<DetailValue>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Single-value reduction of all signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Healthy,
    Warning,
    Critical,
    Unknown,
}

impl OverallStatus {
    /// Gauge encoding used by the metrics exporter
    pub fn as_gauge(&self) -> i64 {
        match self {
            OverallStatus::Healthy => 0,
            OverallStatus::Warning => 1,
            OverallStatus::Critical => 2,
            OverallStatus::Unknown => 3,
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Healthy => write!(f, "HEALTHY"),
            OverallStatus::Warning => write!(f, "WARNING"),
            OverallStatus::Critical => write!(f, "CRITICAL"),
            OverallStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Aggregate view exposed to consumers, recomputed wholesale every cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub system: Option<SystemMetrics>,
    pub docker: Option<DockerStatus>,
    pub runners: Vec<GitHubRunnerStatus>,
    pub recent_alerts: Vec<Alert>,
    pub checks: Vec<HealthCheckResult>,
    pub overall_status: OverallStatus,
    pub timestamp: DateTime<Utc>,
}

impl SystemHealth {
    /// View published before the first aggregation
    pub fn unknown(timestamp: DateTime<Utc>) -> Self {
        Self {
            system: None,
            docker: None,
            runners: Vec::new(),
            recent_alerts: Vec::new(),
            checks: Vec::new(),
            overall_status: OverallStatus::Unknown,
            timestamp,
        }
    }
}
