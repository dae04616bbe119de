//! Server configuration

use anyhow::{Context, Result};
use sentinel_lib::detector::RetrainConfig;
use sentinel_lib::store::RetryPolicy;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration, read from `SENTINEL_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// PostgreSQL connection string of the request log store
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Serve synthetic traffic from memory instead of PostgreSQL
    #[serde(default)]
    pub demo_mode: bool,

    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    #[serde(default = "default_connect_backoff")]
    pub connect_backoff_secs: u64,

    /// Seconds between scheduled retraining cycles
    #[serde(default = "default_retrain_interval")]
    pub retrain_interval_secs: u64,

    #[serde(default = "default_true")]
    pub train_on_startup: bool,

    /// Most recent records used to fit a model
    #[serde(default = "default_training_window")]
    pub training_window: usize,

    /// Records scored by the stats endpoint
    #[serde(default = "default_stats_window")]
    pub stats_window: usize,

    /// Records scored for the downloadable report
    #[serde(default = "default_report_window")]
    pub report_window: usize,

    #[serde(default = "default_model_path")]
    pub model_path: String,
}

fn default_api_port() -> u16 {
    5000
}

fn default_database_url() -> String {
    "postgres://postgres:postgres@db:5433/sentinel".to_string()
}

fn default_connect_attempts() -> u32 {
    30
}

fn default_connect_backoff() -> u64 {
    2
}

fn default_retrain_interval() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

fn default_training_window() -> usize {
    10_000
}

fn default_stats_window() -> usize {
    1000
}

fn default_report_window() -> usize {
    2000
}

fn default_model_path() -> String {
    "isolation_forest_model.json".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            database_url: default_database_url(),
            demo_mode: false,
            connect_attempts: default_connect_attempts(),
            connect_backoff_secs: default_connect_backoff(),
            retrain_interval_secs: default_retrain_interval(),
            train_on_startup: true,
            training_window: default_training_window(),
            stats_window: default_stats_window(),
            report_window: default_report_window(),
            model_path: default_model_path(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_builder(
            config::Config::builder().add_source(
                config::Environment::with_prefix("SENTINEL").try_parsing(true),
            ),
        )
    }

    /// Build from any configured source; missing keys take their defaults
    pub fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        let config: Self = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.connect_attempts == 0 {
            anyhow::bail!("connect_attempts must be at least 1");
        }
        if self.retrain_interval_secs == 0 {
            anyhow::bail!("retrain_interval_secs must be positive");
        }
        if self.stats_window == 0 || self.report_window == 0 || self.training_window == 0 {
            anyhow::bail!("log windows must be positive");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.connect_attempts,
            backoff: Duration::from_secs(self.connect_backoff_secs),
        }
    }

    pub fn model_path(&self) -> PathBuf {
        PathBuf::from(&self.model_path)
    }

    pub fn retrain_config(&self) -> RetrainConfig {
        RetrainConfig {
            interval: Duration::from_secs(self.retrain_interval_secs),
            training_window: self.training_window,
            model_path: Some(self.model_path()),
            train_on_startup: self.train_on_startup,
        }
    }
}
