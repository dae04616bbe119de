//! Output formatting utilities

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
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Render rows as a rounded table, or a placeholder when empty
pub fn render_table<T: Tabled>(rows: Vec<T>, empty: &str) -> String {
    if rows.is_empty() {
        return empty.dimmed().to_string();
    }
    Table::new(rows).with(Style::rounded()).to_string()
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

/// Color a health status
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "ready" => status.green().to_string(),
        "degraded" | "no_data" => status.yellow().to_string(),
        "unhealthy" | "not_ready" | "error" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color an anomaly percentage by severity
pub fn color_percentage(percentage: f64) -> String {
    let formatted = format_percentage(percentage);
    if percentage >= 20.0 {
        formatted.red().bold().to_string()
    } else if percentage >= 5.0 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}

pub fn format_percentage(percentage: f64) -> String {
    format!("{:.1}%", percentage)
}

/// Format a response time in milliseconds
pub fn format_response_time(ms: f64) -> String {
    if ms >= 1000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else {
        format!("{:.0}ms", ms)
    }
}

/// Format an RFC 3339 timestamp for display
pub fn format_timestamp(ts: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(ts) {
        Ok(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        Err(_) => ts.to_string(),
    }
}
