//! Daemon configuration
//!
//! Settings come from an optional TOML file layered under environment
//! variables prefixed `FLEET_MONITOR_`, with `__` separating nested keys
//! (`FLEET_MONITOR_COLLECTORS__DOCKER__INTERVAL_SECS=15`).

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use monitor_lib::config::MonitorSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "FLEET_MONITOR";
const CONFIG_PATH_VAR: &str = "FLEET_MONITOR_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "fleet-monitor.toml";

/// Settings that only concern the daemon process
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    /// Name reported in structured logs
    pub node_name: String,

    /// Port for health, metrics and the query API
    pub api_port: u16,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: 8080,
        }
    }
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub daemon: DaemonSettings,
    pub monitor: MonitorSettings,
}

impl DaemonConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path, environment())
    }

    /// Load from an explicit file (missing is tolerated) and env source
    pub fn load_from(path: &Path, env: Environment) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(env)
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let daemon: DaemonSettings = config
            .clone()
            .try_deserialize()
            .context("Invalid daemon settings")?;
        let monitor: MonitorSettings = config
            .try_deserialize()
            .context("Invalid monitor settings")?;
        monitor.validate()?;

        Ok(Self { daemon, monitor })
    }
}

/// Environment source for the `FLEET_MONITOR_` prefix
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("notifications.suppressed_types")
        .with_list_parse_key("docker.monitored_containers")
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_lib::models::AlertType;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(map))
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = DaemonConfig::load_from(Path::new("/nonexistent/fleet-monitor.toml"), env(&[]))
            .unwrap();
        assert_eq!(config.daemon.api_port, 8080);
        assert_eq!(config.monitor.collectors.docker.interval_secs, 30);
        assert_eq!(config.monitor.alert_retention, 10);
    }

    #[test]
    fn test_file_then_environment() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
node_name = "edge-01"
api_port = 9000
alert_retention = 5

[collectors.runners]
interval_secs = 600

[thresholds.cpu]
warning = 0.7

[notifications]
suppressed_types = ["GITHUB_RUNNER_OFFLINE"]
"#
        )
        .unwrap();

        let config = DaemonConfig::load_from(
            file.path(),
            env(&[
                ("FLEET_MONITOR_API_PORT", "9100"),
                ("FLEET_MONITOR_COLLECTORS__HOST__INTERVAL_SECS", "15"),
                ("FLEET_MONITOR_DOCKER__MONITORED_CONTAINERS", "backend,db"),
            ]),
        )
        .unwrap();

        assert_eq!(config.daemon.node_name, "edge-01");
        assert_eq!(config.daemon.api_port, 9100);
        assert_eq!(config.monitor.alert_retention, 5);
        assert_eq!(config.monitor.collectors.runners.interval_secs, 600);
        assert_eq!(config.monitor.collectors.host.interval_secs, 15);
        assert_eq!(config.monitor.thresholds.cpu.warning, 0.7);
        assert_eq!(config.monitor.thresholds.cpu.critical, 0.95);
        assert!(config
            .monitor
            .notifications
            .suppressed_types
            .contains(&AlertType::GithubRunnerOffline));
        assert_eq!(
            config.monitor.docker.monitored_containers,
            vec!["backend".to_string(), "db".to_string()]
        );
    }

    #[test]
    fn test_invalid_thresholds_are_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[thresholds.ram]\nwarning = 0.99\ncritical = 0.5").unwrap();

        let err = DaemonConfig::load_from(file.path(), env(&[])).unwrap_err();
        assert!(err.to_string().contains("ram"));
    }
}
