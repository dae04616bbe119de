//! Error kinds recovered at the detector's component boundaries

use thiserror::Error;

/// Outcome of a detection operation that did not produce a result
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    /// A record is missing or carries an unusable required field
    #[error("malformed record at index {index}: {reason}")]
    MalformedRecord { index: usize, reason: String },

    /// Not enough records to train or score
    #[error("data unavailable: {available} records, need {required}")]
    DataUnavailable { available: usize, required: usize },

    /// No model has been published yet
    #[error("model not ready")]
    ModelNotReady,

    /// The log store could not be reached
    #[error("log store unavailable: {0}")]
    StoreConnection(String),

    /// Fitting the estimator failed
    #[error("training failed: {0}")]
    TrainingFailure(String),
}

impl DetectionError {
    /// Whether the caller should simply try again later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DetectionError::DataUnavailable { .. } | DetectionError::ModelNotReady
        )
    }
}

/// Errors raised by a log store collaborator
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection failed after {attempts} attempts: {message}")]
    Connection { attempts: u32, message: String },

    #[error("query failed: {0}")]
    Query(String),
}

impl From<StoreError> for DetectionError {
    fn from(err: StoreError) -> Self {
        DetectionError::StoreConnection(err.to_string())
    }
}
