//! Detection commands: statistics, report download and manual training

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use tabled::Tabled;

use crate::client::{ApiClient, Stats, StatsReply, TrainResult};
use crate::output::{
    color_percentage, format_response_time, format_timestamp, print_info, print_json,
    print_success, print_warning, render_table, OutputFormat,
};

const DEFAULT_REPORT_NAME: &str = "sentinel_report.txt";

/// Row for the top offenders table
#[derive(Tabled)]
struct OffenderRow {
    #[tabled(rename = "#")]
    rank: usize,
    #[tabled(rename = "IP Address")]
    ip: String,
    #[tabled(rename = "Anomalous Requests")]
    count: usize,
}

/// Row for the recent anomalies table
#[derive(Tabled)]
struct AnomalyRow {
    #[tabled(rename = "Time")]
    timestamp: String,
    #[tabled(rename = "IP Address")]
    ip: String,
    #[tabled(rename = "Request")]
    request: String,
    #[tabled(rename = "Status")]
    status: i32,
    #[tabled(rename = "Response Time")]
    response_time: String,
}

/// Show anomaly statistics over the most recent requests
pub async fn show_stats(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let reply: StatsReply = client.get("api/stats").await?;

    match (format, reply) {
        (OutputFormat::Json, reply) => print_json(&reply)?,
        (OutputFormat::Table, StatsReply::Status(status)) => {
            print_warning(&format!("{} ({})", status.message, status.status));
        }
        (OutputFormat::Table, StatsReply::Stats(stats)) => print_stats(&stats),
    }

    Ok(())
}

fn print_stats(stats: &Stats) {
    println!("{}", "Anomaly Statistics".bold());
    println!("{}", "=".repeat(50));
    println!("Model version:          {}", stats.model_version.cyan());
    println!("Requests analysed:      {}", stats.total_requests);
    println!("Anomalies detected:     {}", stats.total_anomalies);
    println!(
        "Anomaly rate:           {}",
        color_percentage(stats.anomalies_percentage)
    );
    println!();

    if !stats.new_alerts.is_empty() {
        for ip in &stats.new_alerts {
            println!("{} new offender: {}", "ALERT".red().bold(), ip.bold());
        }
        println!();
    }

    println!("{}", "Top Offenders".bold());
    println!("{}", "-".repeat(50));
    let rows: Vec<OffenderRow> = stats
        .top_ips
        .iter()
        .enumerate()
        .map(|(i, o)| OffenderRow {
            rank: i + 1,
            ip: o.ip.clone(),
            count: o.count,
        })
        .collect();
    println!("{}", render_table(rows, "No offenders"));
    println!();

    println!("{}", "Recent Anomalies".bold());
    println!("{}", "-".repeat(50));
    let rows: Vec<AnomalyRow> = stats
        .recent_anomalies
        .iter()
        .map(|a| AnomalyRow {
            timestamp: format_timestamp(&a.timestamp),
            ip: a.ip_address.clone(),
            request: format!("{} {}", a.method, a.endpoint),
            status: a.status_code,
            response_time: format_response_time(a.response_time),
        })
        .collect();
    println!("{}", render_table(rows, "No anomalies"));
}

/// Download the security report; `-` prints it to stdout
pub async fn download_report(client: &ApiClient, output: Option<String>) -> Result<()> {
    let attachment = client.get_attachment("api/report/download").await?;

    if output.as_deref() == Some("-") {
        print!("{}", attachment.body);
        return Ok(());
    }

    let path = PathBuf::from(
        output
            .or(attachment.filename)
            .unwrap_or_else(|| DEFAULT_REPORT_NAME.to_string()),
    );
    std::fs::write(&path, &attachment.body)
        .with_context(|| format!("Failed to write report to {:?}", path))?;

    print_success(&format!(
        "Report saved to {} ({} bytes)",
        path.display(),
        attachment.body.len()
    ));
    Ok(())
}

/// Run a training cycle now
pub async fn train(client: &ApiClient, format: OutputFormat) -> Result<()> {
    print_info("Requesting training cycle...");
    let result: TrainResult = client.post("api/train").await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            if result.success {
                print_success(&format!(
                    "Published model {} trained on {} records",
                    result.version.as_deref().unwrap_or("unknown"),
                    result.samples.unwrap_or_default()
                ));
            } else {
                print_warning(&format!(
                    "Training skipped: {}",
                    result.reason.as_deref().unwrap_or("unknown reason")
                ));
            }
        }
    }

    Ok(())
}
