//! Alert listing and acknowledgement commands

use anyhow::Result;
use monitor_lib::models::{Alert, AlertLevel, AlertType};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_status, format_timestamp, print_json, print_rows, print_success, OutputFormat};

/// Row for alerts table
#[derive(Tabled)]
pub struct AlertRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Level")]
    level: String,
    #[tabled(rename = "Type")]
    alert_type: String,
    #[tabled(rename = "Subject")]
    subject: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Since")]
    since: String,
    #[tabled(rename = "Ack")]
    acknowledged: String,
}

impl From<&Alert> for AlertRow {
    fn from(alert: &Alert) -> Self {
        Self {
            id: alert.id.clone(),
            level: color_status(alert.level.as_str()),
            alert_type: alert.alert_type.to_string(),
            subject: alert.subject.to_string(),
            message: alert.message.clone(),
            since: format_timestamp(&alert.raised_at),
            acknowledged: if alert.acknowledged { "yes" } else { "" }.to_string(),
        }
    }
}

/// List open alerts
pub async fn list_alerts(
    client: &ApiClient,
    level: Option<AlertLevel>,
    alert_type: Option<AlertType>,
    acknowledged_only: bool,
    format: OutputFormat,
) -> Result<()> {
    let alerts = client
        .list_alerts(level, alert_type, acknowledged_only)
        .await?;

    match format {
        OutputFormat::Json => print_json(&alerts)?,
        OutputFormat::Table => {
            let total = alerts.len();
            let rows: Vec<AlertRow> = alerts.iter().map(AlertRow::from).collect();
            print_rows(rows, "No open alerts");
            if total > 0 {
                println!("\nTotal: {} alerts", total);
            }
        }
    }

    Ok(())
}

/// Acknowledge an alert by ID
pub async fn acknowledge(client: &ApiClient, id: &str) -> Result<()> {
    client.acknowledge(id).await?;
    print_success(&format!("Alert {} acknowledged", id));
    Ok(())
}
