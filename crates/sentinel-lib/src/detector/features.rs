//! Feature extraction shared by training and scoring
//!
//! Turns a batch of log records into one feature vector per record. The two
//! per-address aggregates are computed over the batch passed in, so the same
//! record can yield different vectors in different windows.

use crate::error::DetectionError;
use crate::models::{FeatureVector, LogRecord, NUM_FEATURES};
use std::collections::HashMap;

/// Per-address tallies within one batch
#[derive(Debug, Default, Clone, Copy)]
struct AddressStats {
    requests: usize,
    errors: usize,
}

impl AddressStats {
    fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        self.errors as f64 / self.requests as f64
    }
}

/// Extracts model features from raw log records
#[derive(Debug, Default, Clone, Copy)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract one vector per record, in input order
    ///
    /// Fails on the first malformed record instead of dropping it.
    pub fn extract(&self, records: &[LogRecord]) -> Result<Vec<FeatureVector>, DetectionError> {
        for (index, record) in records.iter().enumerate() {
            record
                .validate()
                .map_err(|reason| DetectionError::MalformedRecord { index, reason })?;
        }

        let stats = aggregate_by_address(records);

        Ok(records
            .iter()
            .map(|record| {
                let s = stats
                    .get(record.ip_address.as_str())
                    .copied()
                    .unwrap_or_default();
                FeatureVector {
                    response_time: record.response_time,
                    has_suspected_payload: if record.has_suspected_payload() {
                        1.0
                    } else {
                        0.0
                    },
                    error_rate: s.error_rate(),
                    request_count: s.requests as f64,
                }
            })
            .collect())
    }

    /// Extract features as rows for the estimator
    pub fn extract_matrix(
        &self,
        records: &[LogRecord],
    ) -> Result<Vec<[f64; NUM_FEATURES]>, DetectionError> {
        Ok(self
            .extract(records)?
            .iter()
            .map(FeatureVector::to_array)
            .collect())
    }
}

fn aggregate_by_address(records: &[LogRecord]) -> HashMap<&str, AddressStats> {
    let mut stats: HashMap<&str, AddressStats> = HashMap::new();
    for record in records {
        let entry = stats.entry(record.ip_address.as_str()).or_default();
        entry.requests += 1;
        if record.is_error() {
            entry.errors += 1;
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(ip: &str, status: i32, response_time: f64, payload: Option<&str>) -> LogRecord {
        LogRecord {
            ip_address: ip.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            endpoint: "/api/data".to_string(),
            method: "GET".to_string(),
            status_code: status,
            response_time,
            suspected_payload: payload.map(str::to_string),
        }
    }

    #[test]
    fn test_empty_batch() {
        let extractor = FeatureExtractor::new();
        assert!(extractor.extract(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_batch_scoped_aggregates() {
        let extractor = FeatureExtractor::new();
        let records = vec![
            record("10.0.0.1", 200, 50.0, None),
            record("10.0.0.1", 401, 40.0, None),
            record("10.0.0.1", 500, 60.0, None),
            record("10.0.0.2", 200, 80.0, Some("id=1' OR '1'='1")),
        ];

        let features = extractor.extract(&records).unwrap();
        assert_eq!(features.len(), 4);

        assert_eq!(features[0].request_count, 3.0);
        assert!((features[0].error_rate - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(features[0].has_suspected_payload, 0.0);
        assert_eq!(features[1].response_time, 40.0);

        assert_eq!(features[3].request_count, 1.0);
        assert_eq!(features[3].error_rate, 0.0);
        assert_eq!(features[3].has_suspected_payload, 1.0);
    }

    #[test]
    fn test_aggregates_depend_on_window() {
        let extractor = FeatureExtractor::new();
        let full = vec![
            record("10.0.0.1", 404, 50.0, None),
            record("10.0.0.1", 200, 50.0, None),
        ];
        let window = &full[1..];

        let in_full = extractor.extract(&full).unwrap()[1];
        let in_window = extractor.extract(window).unwrap()[0];
        assert_eq!(in_full.request_count, 2.0);
        assert_eq!(in_full.error_rate, 0.5);
        assert_eq!(in_window.request_count, 1.0);
        assert_eq!(in_window.error_rate, 0.0);
    }

    #[test]
    fn test_extraction_is_pure() {
        let extractor = FeatureExtractor::new();
        let records = vec![
            record("10.0.0.1", 200, 50.0, None),
            record("10.0.0.2", 500, 300.0, Some("<script>")),
        ];
        let snapshot = records.clone();

        let first = extractor.extract(&records).unwrap();
        let second = extractor.extract(&records).unwrap();

        assert_eq!(records, snapshot);
        let bits = |v: &[FeatureVector]| -> Vec<u64> {
            v.iter()
                .flat_map(|f| f.to_array().map(f64::to_bits))
                .collect()
        };
        assert_eq!(bits(&first), bits(&second));
    }

    #[test]
    fn test_malformed_record_rejected() {
        let extractor = FeatureExtractor::new();
        let records = vec![
            record("10.0.0.1", 200, 50.0, None),
            record("", 200, 50.0, None),
        ];

        let err = extractor.extract(&records).unwrap_err();
        assert!(matches!(err, DetectionError::MalformedRecord { index: 1, .. }));
    }

    #[test]
    fn test_matrix_follows_feature_order() {
        let extractor = FeatureExtractor::new();
        let records = vec![record("10.0.0.9", 500, 250.0, Some("select"))];
        let rows = extractor.extract_matrix(&records).unwrap();
        assert_eq!(rows, vec![[250.0, 1.0, 1.0, 1.0]]);
    }
}
