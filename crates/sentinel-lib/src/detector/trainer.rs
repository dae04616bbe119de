//! Model training
//!
//! Fits an isolation forest on a batch of log records. The hyperparameters
//! below define detection sensitivity; changing them requires bumping
//! `MODEL_SCHEMA`.

use super::features::FeatureExtractor;
use super::forest::{ForestParams, IsolationForest, Row};
use crate::clock::{Clock, SystemClock};
use crate::error::DetectionError;
use crate::models::{LogRecord, FEATURE_NAMES};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Minimum batch size worth fitting a model on
pub const MIN_TRAINING_SIZE: usize = 50;

/// Number of isolation trees
pub const N_ESTIMATORS: usize = 100;

/// Expected fraction of anomalous requests in training data
pub const CONTAMINATION: f64 = 0.15;

/// Fixed seed so that retraining on the same window is reproducible
pub const RANDOM_SEED: u64 = 42;

/// Version tag of the feature layout and hyperparameter set
pub const MODEL_SCHEMA: u32 = 1;

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: N_ESTIMATORS,
            contamination: CONTAMINATION,
            seed: RANDOM_SEED,
        }
    }
}

/// Trained, immutable anomaly model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyModel {
    pub version: String,
    pub schema: u32,
    pub created_at: DateTime<Utc>,
    pub params: ForestParams,
    pub feature_names: Vec<String>,
    pub training_samples: usize,
    forest: IsolationForest,
}

impl AnomalyModel {
    /// Whether this model was trained on the current feature layout
    pub fn is_compatible(&self) -> bool {
        self.schema == MODEL_SCHEMA
            && self.feature_names.len() == FEATURE_NAMES.len()
            && self
                .feature_names
                .iter()
                .zip(FEATURE_NAMES)
                .all(|(a, b)| a == b)
    }

    /// Anomalous flag per row
    pub fn predict(&self, rows: &[Row]) -> Vec<bool> {
        self.forest.predict(rows)
    }

    pub fn score_samples(&self, rows: &[Row]) -> Vec<f64> {
        self.forest.score_samples(rows)
    }

    pub fn forest(&self) -> &IsolationForest {
        &self.forest
    }
}

/// Anything that can turn a batch of records into a model
pub trait Trainer: Send + Sync {
    fn train(&self, records: &[LogRecord]) -> Result<AnomalyModel, DetectionError>;
}

/// Isolation forest trainer with fixed hyperparameters
pub struct ModelTrainer {
    extractor: FeatureExtractor,
    params: ForestParams,
    min_samples: usize,
    clock: Arc<dyn Clock>,
}

impl Default for ModelTrainer {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelTrainer {
    pub fn new() -> Self {
        Self {
            extractor: FeatureExtractor::new(),
            params: ForestParams::default(),
            min_samples: MIN_TRAINING_SIZE,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }
}

impl Trainer for ModelTrainer {
    fn train(&self, records: &[LogRecord]) -> Result<AnomalyModel, DetectionError> {
        if records.len() < self.min_samples {
            return Err(DetectionError::DataUnavailable {
                available: records.len(),
                required: self.min_samples,
            });
        }

        let start = Instant::now();
        let rows = self.extractor.extract_matrix(records)?;
        debug!(rows = rows.len(), "Extracted training features");

        let forest =
            IsolationForest::fit(&rows, &self.params).map_err(DetectionError::TrainingFailure)?;

        let created_at = self.clock.now();
        let model = AnomalyModel {
            version: created_at.format("v%Y%m%d%H%M%S").to_string(),
            schema: MODEL_SCHEMA,
            created_at,
            params: self.params,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            training_samples: rows.len(),
            forest,
        };

        info!(
            version = %model.version,
            samples = model.training_samples,
            n_estimators = self.params.n_estimators,
            contamination = self.params.contamination,
            elapsed_ms = start.elapsed().as_millis(),
            "Model trained"
        );

        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;

    fn records(count: usize) -> Vec<LogRecord> {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        (0..count)
            .map(|i| LogRecord {
                ip_address: format!("192.168.1.{}", i % 10 + 1),
                timestamp: base + chrono::Duration::seconds(i as i64),
                endpoint: "/api/users".to_string(),
                method: "GET".to_string(),
                status_code: if i % 17 == 0 { 404 } else { 200 },
                response_time: 20.0 + (i % 13) as f64 * 7.0,
                suspected_payload: None,
            })
            .collect()
    }

    #[test]
    fn test_default_hyperparameters() {
        let trainer = ModelTrainer::new();
        assert_eq!(trainer.params().n_estimators, 100);
        assert_eq!(trainer.params().contamination, 0.15);
        assert_eq!(trainer.params().seed, 42);
    }

    #[test]
    fn test_insufficient_data() {
        let trainer = ModelTrainer::new();
        let err = trainer.train(&records(MIN_TRAINING_SIZE - 1)).unwrap_err();
        assert_eq!(
            err,
            DetectionError::DataUnavailable {
                available: 49,
                required: 50
            }
        );
    }

    #[test]
    fn test_train_produces_tagged_model() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let trainer = ModelTrainer::new().with_clock(Arc::new(FixedClock(at)));

        let model = trainer.train(&records(120)).unwrap();
        assert_eq!(model.version, "v20240301093000");
        assert_eq!(model.created_at, at);
        assert_eq!(model.training_samples, 120);
        assert_eq!(model.forest().n_trees(), N_ESTIMATORS);
        assert!(model.is_compatible());
    }

    #[test]
    fn test_training_is_deterministic() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let trainer = ModelTrainer::new().with_clock(Arc::new(FixedClock(at)));
        let batch = records(200);
        assert_eq!(trainer.train(&batch).unwrap(), trainer.train(&batch).unwrap());
    }

    #[test]
    fn test_malformed_batch_is_not_trained() {
        let trainer = ModelTrainer::new();
        let mut batch = records(60);
        batch[5].status_code = 0;
        assert!(matches!(
            trainer.train(&batch),
            Err(DetectionError::MalformedRecord { index: 5, .. })
        ));
    }

    #[test]
    fn test_incompatible_feature_layout() {
        let trainer = ModelTrainer::new();
        let mut model = trainer.train(&records(60)).unwrap();
        model.feature_names.swap(0, 1);
        assert!(!model.is_compatible());
    }
}
