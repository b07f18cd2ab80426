//! Output formatting utilities

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any response as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print rows as a rounded table, or a warning when there are none
pub fn print_rows<T: Tabled>(rows: Vec<T>, empty_message: &str) {
    if rows.is_empty() {
        print_warning(empty_message);
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2}Gi", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2}Mi", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2}Ki", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

/// Format a 0..1 ratio as a percentage
pub fn format_ratio(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "running" | "online" | "yes" => status.green().to_string(),
        "warning" | "degraded" | "restarting" | "busy" => status.yellow().to_string(),
        "critical" | "unhealthy" | "offline" | "exited" | "dead" | "no" => {
            status.red().to_string()
        }
        "unknown" => status.dimmed().to_string(),
        _ => status.to_string(),
    }
}

/// Color a usage ratio against warning/critical marks
pub fn color_ratio(ratio: f64, warning: f64, critical: f64) -> String {
    let formatted = format_ratio(ratio);
    if ratio >= critical {
        formatted.red().to_string()
    } else if ratio >= warning {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.00Ki");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.00Gi");
    }

    #[test]
    fn test_format_ratio() {
        assert_eq!(format_ratio(0.973), "97.3%");
        assert_eq!(format_ratio(0.0), "0.0%");
    }

    #[test]
    fn test_color_status_keeps_text() {
        colored::control::set_override(false);
        assert_eq!(color_status("CRITICAL"), "CRITICAL");
        assert_eq!(color_status("running"), "running");
    }
}
