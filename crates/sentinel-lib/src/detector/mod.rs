//! Anomaly detection engine
//!
//! Training and scoring share one [`FeatureExtractor`]; the
//! [`RetrainScheduler`] is the only writer of the [`ModelRegistry`], and
//! every scorer reads an immutable snapshot from it.

mod artifact;
mod features;
mod forest;
mod registry;
mod scheduler;
mod scorer;
mod trainer;

#[cfg(test)]
mod tests;

pub use artifact::{load_model, save_model, ModelArtifact};
pub use features::FeatureExtractor;
pub use forest::{ForestParams, IsolationForest, Row, MAX_SAMPLES};
pub use registry::{ModelRegistry, ModelSnapshot};
pub use scheduler::{
    CycleOutcome, RetrainConfig, RetrainScheduler, DEFAULT_RETRAIN_INTERVAL,
    DEFAULT_TRAINING_WINDOW,
};
pub use scorer::{AnomalyScorer, ScorerConfig, DEFAULT_RECENT_ANOMALIES, DEFAULT_TOP_OFFENDERS};
pub use trainer::{
    AnomalyModel, ModelTrainer, Trainer, CONTAMINATION, MIN_TRAINING_SIZE, MODEL_SCHEMA,
    N_ESTIMATORS, RANDOM_SEED,
};
