//! Container runtime source backed by the docker CLI

use super::{async_trait, HealthSource};
use crate::clock::Clock;
use crate::config::DockerSettings;
use crate::error::CollectionError;
use crate::models::{CollectorKind, ContainerStatus, DockerStatus, Snapshot};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::process::Output;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

const PS_FORMAT: &str = "{{.ID}}|{{.Names}}|{{.State}}|{{.Status}}";
const INSPECT_FORMAT: &str = "{{.Id}}|{{.RestartCount}}";
const SHORT_ID_LEN: usize = 12;

pub struct DockerCliSource {
    binary: String,
    monitored: Vec<String>,
    clock: Arc<dyn Clock>,
}

impl DockerCliSource {
    pub fn new(settings: &DockerSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            binary: settings.binary.clone(),
            monitored: settings.monitored_containers.clone(),
            clock,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Output, CollectionError> {
        Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CollectionError::Unreachable(format!("failed to run {}: {}", self.binary, e)))
    }

    async fn restart_counts(&self, ids: &[String]) -> Result<HashMap<String, u32>, CollectionError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut args = vec!["inspect", "--format", INSPECT_FORMAT];
        args.extend(ids.iter().map(String::as_str));
        let output = self.run(&args).await?;
        if !output.status.success() {
            // A container can disappear between ps and inspect; counts default to zero
            warn!(
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "docker inspect failed"
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(parse_inspect_line)
            .map(|(id, count)| (short_id(&id), count))
            .collect())
    }
}

#[async_trait]
impl HealthSource for DockerCliSource {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Docker
    }

    async fn poll(&self, _timeout: Duration) -> Result<Snapshot, CollectionError> {
        let ping = self
            .run(&["info", "--format", "{{.ServerVersion}}"])
            .await?;
        if !ping.status.success() {
            warn!(
                stderr = %String::from_utf8_lossy(&ping.stderr).trim(),
                "Docker daemon is not accessible"
            );
            return Ok(Snapshot::Docker(DockerStatus::daemon_down(self.clock.now())));
        }

        let listing = self
            .run(&["ps", "-a", "--no-trunc", "--format", PS_FORMAT])
            .await?;
        if !listing.status.success() {
            return Err(CollectionError::Malformed(format!(
                "docker ps failed: {}",
                String::from_utf8_lossy(&listing.stderr).trim()
            )));
        }

        let rows = String::from_utf8_lossy(&listing.stdout)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                parse_ps_line(line)
                    .ok_or_else(|| CollectionError::Malformed(format!("unexpected ps line: {}", line)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let rows: Vec<PsRow> = rows
            .into_iter()
            .filter(|row| is_monitored(&row.name, &self.monitored))
            .collect();

        let ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
        let counts = self.restart_counts(&ids).await?;

        let now = self.clock.now();
        let status = build_status(rows, &counts, &self.monitored, now);
        debug!(
            containers = status.containers.len(),
            "Docker health check: daemon running"
        );
        Ok(Snapshot::Docker(status))
    }
}

/// One `docker ps` row
#[derive(Debug, Clone, PartialEq)]
struct PsRow {
    id: String,
    name: String,
    state: String,
    status: String,
}

fn parse_ps_line(line: &str) -> Option<PsRow> {
    let mut parts = line.trim().splitn(4, '|');
    let id = parts.next()?.trim();
    let names = parts.next()?.trim();
    let state = parts.next()?.trim();
    let status = parts.next()?.trim();
    if id.is_empty() {
        return None;
    }

    Some(PsRow {
        id: id.to_string(),
        name: names
            .split(',')
            .next()
            .unwrap_or(names)
            .trim_start_matches('/')
            .to_string(),
        state: state.to_ascii_lowercase(),
        status: status.to_string(),
    })
}

fn parse_inspect_line(line: &str) -> Option<(String, u32)> {
    let (id, count) = line.trim().split_once('|')?;
    Some((id.trim().to_string(), count.trim().parse().ok()?))
}

fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

fn is_monitored(name: &str, monitored: &[String]) -> bool {
    let name = name.to_lowercase();
    monitored.is_empty() || monitored.iter().any(|m| name.contains(&m.to_lowercase()))
}

/// Assemble the snapshot; monitored names without a matching container are
/// reported with state `not-found`
fn build_status(
    rows: Vec<PsRow>,
    restart_counts: &HashMap<String, u32>,
    monitored: &[String],
    now: DateTime<Utc>,
) -> DockerStatus {
    let mut containers: Vec<ContainerStatus> = rows
        .into_iter()
        .map(|row| {
            let id = short_id(&row.id);
            ContainerStatus {
                restart_count: restart_counts.get(&id).copied().unwrap_or(0),
                is_running: row.state == "running",
                is_restarting: row.state == "restarting",
                name: row.name,
                id,
                state: row.state,
                status: row.status,
                timestamp: now,
            }
        })
        .collect();

    let missing: Vec<ContainerStatus> = monitored
        .iter()
        .filter(|m| {
            let m = m.to_lowercase();
            !containers.iter().any(|c| c.name.to_lowercase().contains(&m))
        })
        .map(|name| ContainerStatus {
            name: name.clone(),
            id: format!("missing-{}", name),
            state: "not-found".to_string(),
            status: "Container not found".to_string(),
            is_running: false,
            is_restarting: false,
            restart_count: 0,
            timestamp: now,
        })
        .collect();
    containers.extend(missing);

    DockerStatus {
        is_daemon_running: true,
        containers,
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_ps_line() {
        let row = parse_ps_line(
            "4f1c2e7d9a0b11223344|web-backend,alias|exited|Exited (137) 2 minutes ago",
        )
        .unwrap();
        assert_eq!(row.id, "4f1c2e7d9a0b11223344");
        assert_eq!(row.name, "web-backend");
        assert_eq!(row.state, "exited");
        assert_eq!(row.status, "Exited (137) 2 minutes ago");

        assert!(parse_ps_line("garbage").is_none());
    }

    #[test]
    fn test_parse_inspect_line() {
        assert_eq!(
            parse_inspect_line("4f1c2e7d9a0b11223344|7"),
            Some(("4f1c2e7d9a0b11223344".to_string(), 7))
        );
        assert_eq!(parse_inspect_line("abc|x"), None);
    }

    #[test]
    fn test_build_status_marks_missing_monitored() {
        let rows = vec![PsRow {
            id: "4f1c2e7d9a0b11223344".to_string(),
            name: "app-backend".to_string(),
            state: "restarting".to_string(),
            status: "Restarting (1) 3 seconds ago".to_string(),
        }];
        let mut counts = HashMap::new();
        counts.insert("4f1c2e7d9a0b".to_string(), 5);
        let monitored = vec!["backend".to_string(), "db".to_string()];

        let status = build_status(rows, &counts, &monitored, t0());
        assert!(status.is_daemon_running);
        assert_eq!(status.containers.len(), 2);

        let backend = &status.containers[0];
        assert_eq!(backend.id, "4f1c2e7d9a0b");
        assert!(backend.is_restarting);
        assert_eq!(backend.restart_count, 5);

        let db = &status.containers[1];
        assert_eq!(db.state, "not-found");
        assert!(!db.is_running);
    }

    #[test]
    fn test_is_monitored() {
        assert!(is_monitored("anything", &[]));
        assert!(is_monitored("Prod-DB", &["db".to_string()]));
        assert!(!is_monitored("cache", &["db".to_string()]));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unreachable() {
        let settings = DockerSettings {
            binary: "/nonexistent/docker-cli".to_string(),
            monitored_containers: vec![],
        };
        let source = DockerCliSource::new(&settings, Arc::new(SystemClock));

        let err = source.poll(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, CollectionError::Unreachable(_)));
    }
}
