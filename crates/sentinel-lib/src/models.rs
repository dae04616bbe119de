//! Core data models for the anomaly detector

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered feature names. Training and inference must agree on this list.
pub const FEATURE_NAMES: [&str; 4] = [
    "response_time",
    "has_suspected_payload",
    "error_rate",
    "request_count",
];

/// Number of features per vector
pub const NUM_FEATURES: usize = FEATURE_NAMES.len();

/// One HTTP request as recorded by the API log filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub ip_address: String,
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub method: String,
    pub status_code: i32,
    /// Response time in milliseconds
    pub response_time: f64,
    /// Present only when the request matched a known attack signature
    pub suspected_payload: Option<String>,
}

impl LogRecord {
    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }

    pub fn has_suspected_payload(&self) -> bool {
        self.suspected_payload.is_some()
    }

    /// Check the fields the feature extractor relies on
    pub fn validate(&self) -> Result<(), String> {
        if self.ip_address.trim().is_empty() {
            return Err("missing source address".to_string());
        }
        if !(100..=599).contains(&self.status_code) {
            return Err(format!("invalid status code {}", self.status_code));
        }
        if !self.response_time.is_finite() || self.response_time < 0.0 {
            return Err(format!("invalid response time {}", self.response_time));
        }
        Ok(())
    }
}

/// Feature vector for the outlier model
///
/// `error_rate` and `request_count` are aggregated over the batch the record
/// was extracted with, not over full history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub response_time: f64,
    pub has_suspected_payload: f64,
    pub error_rate: f64,
    pub request_count: f64,
}

impl FeatureVector {
    /// Values in `FEATURE_NAMES` order
    pub fn to_array(&self) -> [f64; NUM_FEATURES] {
        [
            self.response_time,
            self.has_suspected_payload,
            self.error_rate,
            self.request_count,
        ]
    }
}

/// Binary classification of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Normal,
    Anomalous,
}

/// A record together with its model label
#[derive(Debug, Clone)]
pub struct AnomalyResult<'a> {
    pub record: &'a LogRecord,
    pub label: Label,
}

impl AnomalyResult<'_> {
    pub fn is_anomalous(&self) -> bool {
        self.label == Label::Anomalous
    }
}

/// Source address with its number of anomalous records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffenderCount {
    pub ip: String,
    pub count: usize,
}

/// Anomalous request as surfaced to dashboards and reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEntry {
    pub timestamp: DateTime<Utc>,
    pub ip_address: String,
    pub endpoint: String,
    pub method: String,
    pub response_time: f64,
    pub status_code: i32,
}

impl From<&LogRecord> for AnomalyEntry {
    fn from(record: &LogRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            ip_address: record.ip_address.clone(),
            endpoint: record.endpoint.clone(),
            method: record.method.clone(),
            response_time: record.response_time,
            status_code: record.status_code,
        }
    }
}

/// Summary statistics of one scoring pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub total: usize,
    pub anomaly_count: usize,
    pub anomaly_percentage: f64,
    pub top_offenders: Vec<OffenderCount>,
    pub recent_anomalies: Vec<AnomalyEntry>,
    /// Offending addresses never reported before in this process
    pub new_alerts: Vec<String>,
    pub model_version: String,
}
