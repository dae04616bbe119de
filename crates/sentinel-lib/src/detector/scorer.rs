//! Anomaly scoring
//!
//! Classifies a window of log records with the active model and summarises
//! the result. Summaries are read-only; marking offenders as alerted is a
//! separate step performed by [`AnomalyScorer::score`].

use super::features::FeatureExtractor;
use super::registry::ModelRegistry;
use super::trainer::AnomalyModel;
use crate::alerts::AlertTracker;
use crate::error::DetectionError;
use crate::models::{AnomalyEntry, AnomalyResult, Label, LogRecord, OffenderCount, ScoreReport};
use crate::observability::{DetectorMetrics, StructuredLogger};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Default number of top offending addresses reported
pub const DEFAULT_TOP_OFFENDERS: usize = 5;

/// Default number of recent anomalous requests reported
pub const DEFAULT_RECENT_ANOMALIES: usize = 20;

/// Scorer output sizes
#[derive(Debug, Clone, Copy)]
pub struct ScorerConfig {
    pub top_offenders: usize,
    pub recent_anomalies: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            top_offenders: DEFAULT_TOP_OFFENDERS,
            recent_anomalies: DEFAULT_RECENT_ANOMALIES,
        }
    }
}

/// Scores log windows against the registry's active model
pub struct AnomalyScorer {
    extractor: FeatureExtractor,
    config: ScorerConfig,
    registry: Arc<ModelRegistry>,
    alerts: Arc<AlertTracker>,
    metrics: Option<DetectorMetrics>,
    logger: Option<StructuredLogger>,
}

impl AnomalyScorer {
    pub fn new(registry: Arc<ModelRegistry>, alerts: Arc<AlertTracker>) -> Self {
        Self {
            extractor: FeatureExtractor::new(),
            config: ScorerConfig::default(),
            registry,
            alerts,
            metrics: None,
            logger: None,
        }
    }

    pub fn with_config(mut self, config: ScorerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_metrics(mut self, metrics: DetectorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Label every record in the window
    pub fn classify<'a>(
        &self,
        records: &'a [LogRecord],
        model: &AnomalyModel,
    ) -> Result<Vec<AnomalyResult<'a>>, DetectionError> {
        let rows = self.extractor.extract_matrix(records)?;
        let flags = model.predict(&rows);
        Ok(records
            .iter()
            .zip(flags)
            .map(|(record, anomalous)| AnomalyResult {
                record,
                label: if anomalous {
                    Label::Anomalous
                } else {
                    Label::Normal
                },
            })
            .collect())
    }

    /// Summarise a window against `model` without touching alert state
    ///
    /// A missing model is reported before an empty window, so callers can
    /// tell "poll later" apart from "nothing to score".
    pub fn evaluate(
        &self,
        records: &[LogRecord],
        model: Option<&AnomalyModel>,
    ) -> Result<ScoreReport, DetectionError> {
        let model = model.ok_or(DetectionError::ModelNotReady)?;
        if records.is_empty() {
            return Err(DetectionError::DataUnavailable {
                available: 0,
                required: 1,
            });
        }

        let start = Instant::now();
        let results = self.classify(records, model)?;
        let report = self.summarise(&results, &model.version);

        if let Some(metrics) = &self.metrics {
            metrics.observe_scoring_latency(start.elapsed().as_secs_f64());
            metrics.add_anomalies_detected(report.anomaly_count as u64);
            metrics.set_last_anomaly_percentage(report.anomaly_percentage);
        }

        debug!(
            total = report.total,
            anomalies = report.anomaly_count,
            model_version = %report.model_version,
            elapsed_us = start.elapsed().as_micros(),
            "Scored window"
        );
        Ok(report)
    }

    /// Score against the active model without recording alerts
    pub fn inspect(&self, records: &[LogRecord]) -> Result<ScoreReport, DetectionError> {
        let snapshot = self.registry.get();
        self.evaluate(records, snapshot.as_deref())
    }

    /// Score against the active model and report offenders never seen before
    ///
    /// Only the reported top offenders are marked as alerted. An anomalous
    /// address outside the top K stays unalerted until it ranks among them.
    pub fn score(&self, records: &[LogRecord]) -> Result<ScoreReport, DetectionError> {
        let mut report = self.inspect(records)?;

        let fresh = self
            .alerts
            .diff_and_update(report.top_offenders.iter().map(|o| o.ip.as_str()));
        report.new_alerts = fresh.into_iter().collect();

        if let Some(logger) = &self.logger {
            for offender in &report.top_offenders {
                if report.new_alerts.contains(&offender.ip) {
                    logger.log_new_offender(&offender.ip, offender.count);
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.add_new_alerts(report.new_alerts.len() as u64);
            metrics.set_alerted_addresses(self.alerts.alerted_count() as i64);
        }
        Ok(report)
    }

    fn summarise(&self, results: &[AnomalyResult<'_>], model_version: &str) -> ScoreReport {
        let anomalies: Vec<&LogRecord> = results
            .iter()
            .filter(|r| r.is_anomalous())
            .map(|r| r.record)
            .collect();

        let total = results.len();
        let anomaly_count = anomalies.len();

        ScoreReport {
            total,
            anomaly_count,
            anomaly_percentage: percentage(anomaly_count, total),
            top_offenders: top_offenders(&anomalies, self.config.top_offenders),
            recent_anomalies: recent_anomalies(&anomalies, self.config.recent_anomalies),
            new_alerts: Vec::new(),
            model_version: model_version.to_string(),
        }
    }
}

/// Share of `part` in `total` as a percentage rounded to one decimal
fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 1000.0).round() / 10.0
}

/// Addresses with the most anomalous records, ties broken by address
fn top_offenders(anomalies: &[&LogRecord], k: usize) -> Vec<OffenderCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in anomalies {
        *counts.entry(record.ip_address.as_str()).or_default() += 1;
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(k)
        .map(|(ip, count)| OffenderCount {
            ip: ip.to_string(),
            count,
        })
        .collect()
}

/// Most recent anomalous records, newest first
fn recent_anomalies(anomalies: &[&LogRecord], n: usize) -> Vec<AnomalyEntry> {
    let mut sorted = anomalies.to_vec();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    sorted.into_iter().take(n).map(AnomalyEntry::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn record(ip: &str, minutes_ago: i64) -> LogRecord {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        LogRecord {
            ip_address: ip.to_string(),
            timestamp: now - Duration::minutes(minutes_ago),
            endpoint: "/api/data".to_string(),
            method: "GET".to_string(),
            status_code: 200,
            response_time: 50.0,
            suspected_payload: None,
        }
    }

    fn scorer() -> AnomalyScorer {
        AnomalyScorer::new(Arc::new(ModelRegistry::new()), Arc::new(AlertTracker::new()))
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(0, 10), 0.0);
        assert_eq!(percentage(1, 3), 33.3);
        assert_eq!(percentage(2, 3), 66.7);
        assert_eq!(percentage(146, 970), 15.1);
        assert_eq!(percentage(5, 0), 0.0);
    }

    #[test]
    fn test_top_offenders_ranking_and_ties() {
        let records = vec![
            record("b", 1),
            record("a", 2),
            record("c", 3),
            record("c", 4),
            record("d", 5),
        ];
        let refs: Vec<&LogRecord> = records.iter().collect();

        let top = top_offenders(&refs, 3);
        let ranked: Vec<(&str, usize)> = top.iter().map(|o| (o.ip.as_str(), o.count)).collect();
        assert_eq!(ranked, vec![("c", 2), ("a", 1), ("b", 1)]);
    }

    #[test]
    fn test_recent_anomalies_newest_first() {
        let records = vec![record("a", 30), record("b", 5), record("c", 15)];
        let refs: Vec<&LogRecord> = records.iter().collect();

        let recent = recent_anomalies(&refs, 2);
        let ips: Vec<&str> = recent.iter().map(|e| e.ip_address.as_str()).collect();
        assert_eq!(ips, vec!["b", "c"]);
    }

    #[test]
    fn test_not_ready_regardless_of_batch() {
        let scorer = scorer();
        assert_eq!(scorer.score(&[]).unwrap_err(), DetectionError::ModelNotReady);
        assert_eq!(
            scorer.score(&[record("a", 1)]).unwrap_err(),
            DetectionError::ModelNotReady
        );
    }
}
