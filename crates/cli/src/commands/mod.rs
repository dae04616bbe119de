//! CLI command implementations

pub mod detection;
pub mod health;
