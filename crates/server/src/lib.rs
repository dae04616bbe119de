//! Sentinel detection server
//!
//! HTTP surface over the detection engine: dashboard statistics, the
//! downloadable security report, manual retraining and operational probes.

pub mod api;
pub mod config;
pub mod report;
