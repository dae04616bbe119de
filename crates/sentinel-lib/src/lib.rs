//! Request-log anomaly detection
//!
//! This crate provides the core functionality for:
//! - Feature extraction and isolation forest training over API request logs
//! - Hot-swappable model publication and periodic retraining
//! - Scoring, offender ranking and one-shot alert deduplication
//! - Log store access, health checks and observability

pub mod alerts;
pub mod clock;
pub mod detector;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod store;
pub mod synthetic;

pub use alerts::AlertTracker;
pub use error::{DetectionError, StoreError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{DetectorMetrics, StructuredLogger};
