//! Container and runner status commands

use anyhow::Result;
use monitor_lib::models::{DockerStatus, GitHubRunnerStatus};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_status, format_timestamp, print_json, print_rows, print_warning, OutputFormat};

/// Row for containers table
#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Restarts")]
    restarts: u32,
}

/// Row for runners table
#[derive(Tabled)]
struct RunnerRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Busy")]
    busy: String,
    #[tabled(rename = "Labels")]
    labels: String,
}

/// Show container runtime status
pub async fn show_containers(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let docker: DockerStatus = client.get("api/v1/docker").await?;

    match format {
        OutputFormat::Json => print_json(&docker)?,
        OutputFormat::Table => {
            if !docker.is_daemon_running {
                print_warning("Docker daemon is not running");
                return Ok(());
            }
            println!("Sampled: {}", format_timestamp(&docker.timestamp));
            let rows: Vec<ContainerRow> = docker
                .containers
                .iter()
                .map(|c| ContainerRow {
                    name: c.name.clone(),
                    id: c.id.chars().take(12).collect(),
                    state: color_status(&c.state),
                    status: c.status.clone(),
                    restarts: c.restart_count,
                })
                .collect();
            print_rows(rows, "No containers found");
        }
    }

    Ok(())
}

/// Show CI runner status
pub async fn show_runners(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let runners: Vec<GitHubRunnerStatus> = client.get("api/v1/runners").await?;

    match format {
        OutputFormat::Json => print_json(&runners)?,
        OutputFormat::Table => {
            let rows: Vec<RunnerRow> = runners
                .iter()
                .map(|r| RunnerRow {
                    id: r.id,
                    name: r.name.clone(),
                    status: color_status(&r.status),
                    busy: if r.is_busy { color_status("busy") } else { String::new() },
                    labels: r.labels.join(","),
                })
                .collect();
            print_rows(rows, "No runners registered");
        }
    }

    Ok(())
}
