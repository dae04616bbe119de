//! Retraining loop
//!
//! Periodically fetches the latest log window, fits a new model off the
//! async runtime, persists it and publishes it. A failed cycle is logged and
//! skipped; the previously published model stays active.

use super::artifact;
use super::registry::{ModelRegistry, ModelSnapshot};
use super::trainer::Trainer;
use crate::error::DetectionError;
use crate::health::{components, HealthRegistry};
use crate::observability::{DetectorMetrics, StructuredLogger};
use crate::store::LogStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default retraining interval (hourly)
pub const DEFAULT_RETRAIN_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default number of most recent records fetched per cycle
pub const DEFAULT_TRAINING_WINDOW: usize = 10_000;

const IN_PROGRESS: &str = "training already in progress";

/// Configuration for the retraining scheduler
#[derive(Debug, Clone)]
pub struct RetrainConfig {
    /// Time between scheduled cycles
    pub interval: Duration,
    /// Maximum records fetched for one fit
    pub training_window: usize,
    /// Where the artifact is written; `None` keeps models in memory only
    pub model_path: Option<PathBuf>,
    /// Run the first cycle immediately instead of after one interval
    pub train_on_startup: bool,
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RETRAIN_INTERVAL,
            training_window: DEFAULT_TRAINING_WINDOW,
            model_path: None,
            train_on_startup: true,
        }
    }
}

/// Result of one training cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Published { version: String, samples: usize },
    Skipped { reason: String },
}

impl CycleOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, CycleOutcome::Published { .. })
    }
}

/// Sole writer of the model registry
pub struct RetrainScheduler {
    trainer: Arc<dyn Trainer>,
    store: Arc<dyn LogStore>,
    registry: Arc<ModelRegistry>,
    config: RetrainConfig,
    cycle_lock: Mutex<()>,
    metrics: Option<DetectorMetrics>,
    logger: Option<StructuredLogger>,
    health: Option<HealthRegistry>,
}

impl RetrainScheduler {
    pub fn new(
        trainer: Arc<dyn Trainer>,
        store: Arc<dyn LogStore>,
        registry: Arc<ModelRegistry>,
        config: RetrainConfig,
    ) -> Self {
        Self {
            trainer,
            store,
            registry,
            config,
            cycle_lock: Mutex::new(()),
            metrics: None,
            logger: None,
            health: None,
        }
    }

    pub fn with_metrics(mut self, metrics: DetectorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Run the retraining loop until `shutdown` fires
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            training_window = self.config.training_window,
            train_on_startup = self.config.train_on_startup,
            "Starting retraining scheduler"
        );

        let first = if self.config.train_on_startup {
            tokio::time::Instant::now()
        } else {
            tokio::time::Instant::now() + self.config.interval
        };
        let mut ticker = interval_at(first, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if let Some(health) = &self.health {
            health.set_healthy(components::SCHEDULER).await;
        }

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down retraining scheduler");
                    break;
                }
            }
        }

        if let Some(health) = &self.health {
            health
                .set_degraded(components::SCHEDULER, "scheduler stopped")
                .await;
        }
    }

    /// Run one cycle, waiting for any cycle already in flight
    pub async fn run_cycle(&self) -> CycleOutcome {
        let _guard = self.cycle_lock.lock().await;
        self.cycle().await
    }

    /// Run one cycle now unless another is already running
    pub async fn trigger(&self) -> CycleOutcome {
        match self.cycle_lock.try_lock() {
            Ok(_guard) => self.cycle().await,
            Err(_) => {
                debug!("Manual training rejected, cycle in progress");
                CycleOutcome::Skipped {
                    reason: IN_PROGRESS.to_string(),
                }
            }
        }
    }

    async fn cycle(&self) -> CycleOutcome {
        let start = Instant::now();

        match self.train_and_publish().await {
            Ok(snapshot) => {
                let elapsed = start.elapsed();
                if let Some(metrics) = &self.metrics {
                    metrics.inc_training_cycles();
                    metrics.observe_training_duration(elapsed.as_secs_f64());
                    metrics.set_model_version(&snapshot.version);
                }
                if let Some(logger) = &self.logger {
                    logger.log_model_trained(
                        &snapshot.version,
                        snapshot.training_samples,
                        elapsed.as_millis(),
                    );
                }
                CycleOutcome::Published {
                    version: snapshot.version.clone(),
                    samples: snapshot.training_samples,
                }
            }
            Err(e) => {
                if e.is_transient() {
                    info!(error = %e, "Training cycle skipped");
                } else {
                    warn!(error = %e, "Training cycle failed");
                }
                if let Some(metrics) = &self.metrics {
                    metrics.inc_training_failures();
                }
                if let Some(logger) = &self.logger {
                    logger.log_training_skipped(&e.to_string());
                }
                CycleOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn train_and_publish(&self) -> Result<ModelSnapshot, DetectionError> {
        let batch = match self.store.fetch_recent(self.config.training_window).await {
            Ok(batch) => {
                if let Some(health) = &self.health {
                    health.set_healthy(components::STORE).await;
                }
                batch
            }
            Err(e) => {
                if let Some(logger) = &self.logger {
                    logger.log_store_unavailable(&e.to_string());
                }
                if let Some(health) = &self.health {
                    health.set_degraded(components::STORE, e.to_string()).await;
                }
                return Err(e.into());
            }
        };

        if batch.rejected > 0 {
            warn!(
                rejected = batch.rejected,
                accepted = batch.len(),
                "Skipped malformed log rows"
            );
        }

        let trainer = Arc::clone(&self.trainer);
        let records = batch.records;
        let model = tokio::task::spawn_blocking(move || trainer.train(&records))
            .await
            .map_err(|e| DetectionError::TrainingFailure(format!("training task failed: {}", e)))??;

        let model = match self.config.model_path.clone() {
            Some(path) => tokio::task::spawn_blocking(move || {
                artifact::save_model(&model, &path).map(|_| model)
            })
            .await
            .map_err(|e| DetectionError::TrainingFailure(format!("persist task failed: {}", e)))?
            .map_err(|e| {
                DetectionError::TrainingFailure(format!("failed to persist model: {:#}", e))
            })?,
            None => model,
        };

        let previous = self.registry.current_version();
        let snapshot = self.registry.publish(model);

        if let Some(logger) = &self.logger {
            logger.log_model_published(previous.as_deref(), &snapshot.version);
        }
        if let Some(health) = &self.health {
            health.model_published(&snapshot.version).await;
        }

        Ok(snapshot)
    }
}
