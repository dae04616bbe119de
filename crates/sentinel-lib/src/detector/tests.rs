//! End-to-end detection tests over the synthetic reference traffic

use super::*;
use crate::alerts::AlertTracker;
use crate::error::DetectionError;
use crate::models::LogRecord;
use crate::synthetic::{TrafficGenerator, BRUTE_FORCE_IP, INJECTION_IP};
use chrono::{TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;

fn reference_records() -> Vec<LogRecord> {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    TrafficGenerator::new(42).anchored_at(now).reference_dataset()
}

fn trained_registry(records: &[LogRecord]) -> Arc<ModelRegistry> {
    let registry = Arc::new(ModelRegistry::new());
    registry.publish(ModelTrainer::new().train(records).unwrap());
    registry
}

#[test]
fn test_reference_traffic_flags_attackers() {
    let records = reference_records();
    let registry = trained_registry(&records);
    let scorer = AnomalyScorer::new(registry, Arc::new(AlertTracker::new()));

    let report = scorer.score(&records).unwrap();

    assert_eq!(report.total, 970);
    assert!(
        (13.0..=17.0).contains(&report.anomaly_percentage),
        "anomaly percentage {} outside expected band",
        report.anomaly_percentage
    );
    assert!(report.top_offenders.len() <= DEFAULT_TOP_OFFENDERS);
    assert!(report.recent_anomalies.len() <= DEFAULT_RECENT_ANOMALIES);

    let offenders: Vec<&str> = report.top_offenders.iter().map(|o| o.ip.as_str()).collect();
    assert!(offenders.contains(&BRUTE_FORCE_IP), "offenders: {:?}", offenders);
    assert!(offenders.contains(&INJECTION_IP), "offenders: {:?}", offenders);

    assert!(report
        .recent_anomalies
        .windows(2)
        .all(|w| w[0].timestamp >= w[1].timestamp));
}

#[test]
fn test_scoring_uses_training_feature_layout() {
    let records = reference_records();
    let registry = trained_registry(&records);
    let model = registry.get().unwrap();
    let scorer = AnomalyScorer::new(registry.clone(), Arc::new(AlertTracker::new()));

    let rows = FeatureExtractor::new().extract_matrix(&records).unwrap();
    let expected = model.predict(&rows).into_iter().filter(|f| *f).count();

    let report = scorer.inspect(&records).unwrap();
    assert_eq!(report.anomaly_count, expected);
    assert_eq!(report.model_version, model.version);
}

#[test]
fn test_offenders_alerted_once() {
    let records = reference_records();
    let scorer = AnomalyScorer::new(trained_registry(&records), Arc::new(AlertTracker::new()));

    let first = scorer.score(&records).unwrap();
    assert!(first.new_alerts.iter().any(|ip| ip == BRUTE_FORCE_IP));

    let second = scorer.score(&records).unwrap();
    assert!(second.new_alerts.is_empty());
    assert_eq!(second.top_offenders, first.top_offenders);
}

#[test]
fn test_only_top_offenders_are_alerted() {
    let records = reference_records();
    let registry = trained_registry(&records);
    let ranked = AnomalyScorer::new(registry.clone(), Arc::new(AlertTracker::new()))
        .inspect(&records)
        .unwrap();
    assert!(ranked.top_offenders.len() >= 2);

    let alerts = Arc::new(AlertTracker::new());
    let scorer = AnomalyScorer::new(registry, alerts.clone()).with_config(ScorerConfig {
        top_offenders: 1,
        recent_anomalies: DEFAULT_RECENT_ANOMALIES,
    });

    let report = scorer.score(&records).unwrap();
    assert_eq!(report.new_alerts, vec![ranked.top_offenders[0].ip.clone()]);
    assert_eq!(alerts.alerted_count(), 1);
    assert!(!alerts.is_alerted(&ranked.top_offenders[1].ip));
}

#[test]
fn test_inspect_leaves_alerts_untouched() {
    let records = reference_records();
    let alerts = Arc::new(AlertTracker::new());
    let scorer = AnomalyScorer::new(trained_registry(&records), alerts.clone());

    let report = scorer.inspect(&records).unwrap();
    assert!(report.new_alerts.is_empty());
    assert_eq!(alerts.alerted_count(), 0);
}

#[test]
fn test_not_ready_before_empty_batch() {
    let scorer = AnomalyScorer::new(
        Arc::new(ModelRegistry::new()),
        Arc::new(AlertTracker::new()),
    );
    assert_eq!(scorer.score(&[]).unwrap_err(), DetectionError::ModelNotReady);

    let records = reference_records();
    let scorer = AnomalyScorer::new(trained_registry(&records), Arc::new(AlertTracker::new()));
    assert_eq!(
        scorer.score(&[]).unwrap_err(),
        DetectionError::DataUnavailable {
            available: 0,
            required: 1
        }
    );
}

#[test]
fn test_malformed_record_rejected_at_scoring() {
    let mut records = reference_records();
    let scorer = AnomalyScorer::new(trained_registry(&records), Arc::new(AlertTracker::new()));

    records[3].status_code = 0;
    match scorer.score(&records) {
        Err(DetectionError::MalformedRecord { index, .. }) => assert_eq!(index, 3),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_scoring_reports_each_offender_once() {
    let records = Arc::new(reference_records());
    let scorer = Arc::new(AnomalyScorer::new(
        trained_registry(&records),
        Arc::new(AlertTracker::new()),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let scorer = Arc::clone(&scorer);
            let records = Arc::clone(&records);
            tokio::spawn(async move { scorer.score(&records).unwrap().new_alerts })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for ip in handle.await.unwrap() {
            assert!(seen.insert(ip.clone()), "{} reported twice", ip);
        }
    }
    assert!(seen.contains(BRUTE_FORCE_IP));
}

#[test]
fn test_snapshot_scoring_unaffected_by_republish() {
    let records = reference_records();
    let registry = trained_registry(&records);
    let scorer = AnomalyScorer::new(registry.clone(), Arc::new(AlertTracker::new()));
    let held = registry.get().unwrap();

    let before = scorer.evaluate(&records, Some(held.as_ref())).unwrap();

    let mut replacement = ModelTrainer::new()
        .train(&TrafficGenerator::new(1).normal_traffic(200))
        .unwrap();
    replacement.version = "replacement".to_string();
    registry.publish(replacement);

    let after = scorer.evaluate(&records, Some(held.as_ref())).unwrap();
    assert_eq!(before, after);
    assert_eq!(scorer.inspect(&records).unwrap().model_version, "replacement");
}
