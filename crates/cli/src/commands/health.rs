//! Health view and collector check commands

use anyhow::Result;
use colored::Colorize;
use monitor_lib::config::UsageBand;
use monitor_lib::models::{HealthCheckResult, SystemHealth};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::commands::alerts::AlertRow;
use crate::output::{
    color_ratio, color_status, format_bytes, format_timestamp, print_info, print_json, print_rows,
    OutputFormat,
};

/// Row for checks table
#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Healthy")]
    healthy: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Checked")]
    checked: String,
}

impl From<&HealthCheckResult> for CheckRow {
    fn from(check: &HealthCheckResult) -> Self {
        Self {
            component: check.component.clone(),
            healthy: color_status(if check.is_healthy { "yes" } else { "no" }),
            message: check.message.clone(),
            checked: format_timestamp(&check.timestamp),
        }
    }
}

/// Show the aggregated health view
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: SystemHealth = client.get("api/v1/health").await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => print_health(&health),
    }

    Ok(())
}

fn print_health(health: &SystemHealth) {
    let band = UsageBand::default();

    println!("{}", "Fleet Health".bold());
    println!("{}", "=".repeat(60));
    println!(
        "Overall:  {}",
        color_status(&health.overall_status.to_string())
    );
    println!("Updated:  {}", format_timestamp(&health.timestamp));
    println!();

    match &health.system {
        Some(m) => {
            println!("{}", "Host".bold());
            println!(
                "  CPU:  {}",
                color_ratio(m.cpu_usage, band.warning, band.critical)
            );
            println!(
                "  RAM:  {} ({} / {})",
                color_ratio(m.ram_usage, band.warning, band.critical),
                format_bytes(m.ram_used),
                format_bytes(m.ram_total)
            );
            println!(
                "  SSD:  {} ({} / {})",
                color_ratio(m.ssd_usage, band.warning, band.critical),
                format_bytes(m.ssd_used),
                format_bytes(m.ssd_total)
            );
            if let Some(level) = m.battery_level {
                let power = match m.is_power_connected {
                    Some(true) => " (charging)",
                    _ => "",
                };
                println!("  Battery: {}%{}", level, power);
            }
        }
        None => print_info("No host metrics collected yet"),
    }

    match &health.docker {
        Some(docker) if docker.is_daemon_running => {
            let running = docker.containers.iter().filter(|c| c.is_running).count();
            println!(
                "{} {}/{} containers running",
                "Docker:".bold(),
                running,
                docker.containers.len()
            );
        }
        Some(_) => println!("{} {}", "Docker:".bold(), color_status("offline")),
        None => print_info("No container status collected yet"),
    }

    if !health.runners.is_empty() {
        let online = health.runners.iter().filter(|r| r.is_online).count();
        println!(
            "{} {}/{} online",
            "Runners:".bold(),
            online,
            health.runners.len()
        );
    }

    println!();
    println!("{}", "Recent alerts".bold());
    let rows: Vec<AlertRow> = health.recent_alerts.iter().map(AlertRow::from).collect();
    print_rows(rows, "No open alerts");
}

/// Show the latest verdict per collector
pub async fn show_checks(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let checks: Vec<HealthCheckResult> = client.get("api/v1/checks").await?;

    match format {
        OutputFormat::Json => print_json(&checks)?,
        OutputFormat::Table => {
            let rows: Vec<CheckRow> = checks.iter().map(CheckRow::from).collect();
            print_rows(rows, "No collector has reported yet");
        }
    }

    Ok(())
}
