//! Plain-text security report

use chrono::{DateTime, Utc};
use sentinel_lib::ScoreReport;
use std::fmt::Write;

/// Anomalous requests listed in a downloaded report
pub const REPORT_RECENT_ANOMALIES: usize = 50;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Attachment name for a report generated at `at`
pub fn report_filename(at: DateTime<Utc>) -> String {
    format!("sentinel_report_{}.txt", at.format("%Y%m%d"))
}

/// Render a scored window as the downloadable text report
pub fn render_report(report: &ScoreReport, generated_at: DateTime<Utc>) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(out, "=== SENTINEL SECURITY REPORT ===");
    let _ = writeln!(out, "Generated: {}", generated_at.format(TIMESTAMP_FORMAT));
    let _ = writeln!(out, "Model version: {}", report.model_version);
    let _ = writeln!(out, "Total requests analysed: {}", report.total);
    let _ = writeln!(
        out,
        "Total threats detected: {} ({}%)",
        report.anomaly_count, report.anomaly_percentage
    );

    let _ = writeln!(out, "\n--- TOP OFFENDING ADDRESSES ---");
    for offender in &report.top_offenders {
        let _ = writeln!(
            out,
            "- IP: {} | {} malicious requests",
            offender.ip, offender.count
        );
    }

    let _ = writeln!(out, "\n--- LATEST ATTACKS ---");
    for entry in &report.recent_anomalies {
        let _ = writeln!(
            out,
            "[{}] {} -> {} {} (Status: {})",
            entry.timestamp.format(TIMESTAMP_FORMAT),
            entry.ip_address,
            entry.method,
            entry.endpoint,
            entry.status_code
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sentinel_lib::{AnomalyEntry, OffenderCount};

    fn sample() -> ScoreReport {
        ScoreReport {
            total: 970,
            anomaly_count: 146,
            anomaly_percentage: 15.1,
            top_offenders: vec![
                OffenderCount {
                    ip: "10.0.0.45".to_string(),
                    count: 126,
                },
                OffenderCount {
                    ip: "45.33.22.11".to_string(),
                    count: 20,
                },
            ],
            recent_anomalies: vec![AnomalyEntry {
                timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 11, 55, 3).unwrap(),
                ip_address: "10.0.0.45".to_string(),
                endpoint: "/api/auth/login".to_string(),
                method: "POST".to_string(),
                response_time: 42.0,
                status_code: 401,
            }],
            new_alerts: vec![],
            model_version: "v20240601110000".to_string(),
        }
    }

    #[test]
    fn test_report_filename() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 23, 59, 0).unwrap();
        assert_eq!(report_filename(at), "sentinel_report_20240601.txt");
    }

    #[test]
    fn test_render_report() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let text = render_report(&sample(), at);

        assert!(text.starts_with("=== SENTINEL SECURITY REPORT ===\n"));
        assert!(text.contains("Generated: 2024-06-01 12:00:00"));
        assert!(text.contains("Total requests analysed: 970"));
        assert!(text.contains("Total threats detected: 146 (15.1%)"));
        assert!(text.contains("- IP: 10.0.0.45 | 126 malicious requests"));
        assert!(text.contains("[2024-06-01 11:55:03] 10.0.0.45 -> POST /api/auth/login (Status: 401)"));

        let top = text.find("10.0.0.45 |").unwrap();
        let second = text.find("45.33.22.11 |").unwrap();
        assert!(top < second);
    }
}
