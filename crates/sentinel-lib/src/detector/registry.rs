//! Active model registry
//!
//! Holds the currently published model behind a watch channel. Publishing
//! swaps the shared `Arc` in one step; readers clone the `Arc` and keep
//! their snapshot for as long as they need it, regardless of later
//! publishes. A superseded model is dropped once the last reader lets go.

use super::artifact;
use super::trainer::AnomalyModel;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Immutable reference to one trained model
pub type ModelSnapshot = Arc<AnomalyModel>;

/// Registry of the currently active model
#[derive(Debug)]
pub struct ModelRegistry {
    current: watch::Sender<Option<ModelSnapshot>>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    /// Create an empty registry; `get` returns `None` until the first publish
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self { current }
    }

    /// Current snapshot, or `None` if no model has been published yet
    pub fn get(&self) -> Option<ModelSnapshot> {
        self.current.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Install `model` as the active model and return its snapshot
    pub fn publish(&self, model: AnomalyModel) -> ModelSnapshot {
        let snapshot = Arc::new(model);
        let previous = self.current.send_replace(Some(Arc::clone(&snapshot)));
        info!(
            version = %snapshot.version,
            previous = previous.as_ref().map(|m| m.version.as_str()).unwrap_or("none"),
            "Published model"
        );
        snapshot
    }

    /// Load a persisted artifact and publish it
    pub fn publish_file(&self, path: &Path) -> Result<ModelSnapshot> {
        let model = artifact::load_model(path)?;
        Ok(self.publish(model))
    }

    /// Version of the active model, if any
    pub fn current_version(&self) -> Option<String> {
        self.current.borrow().as_ref().map(|m| m.version.clone())
    }

    /// Receiver notified on every publish
    pub fn subscribe(&self) -> watch::Receiver<Option<ModelSnapshot>> {
        self.current.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::trainer::{ModelTrainer, Trainer};
    use crate::synthetic::TrafficGenerator;
    use tempfile::TempDir;

    fn model(version: &str) -> AnomalyModel {
        let records = TrafficGenerator::new(5).normal_traffic(80);
        let mut model = ModelTrainer::new().train(&records).unwrap();
        model.version = version.to_string();
        model
    }

    #[test]
    fn test_not_ready_before_publish() {
        let registry = ModelRegistry::new();
        assert!(registry.get().is_none());
        assert!(!registry.is_ready());
        assert!(registry.current_version().is_none());
    }

    #[test]
    fn test_publish_then_get() {
        let registry = ModelRegistry::new();
        let published = registry.publish(model("m1"));

        let snapshot = registry.get().unwrap();
        assert!(Arc::ptr_eq(&published, &snapshot));
        assert_eq!(registry.current_version().as_deref(), Some("m1"));
    }

    #[test]
    fn test_snapshot_survives_later_publish() {
        let registry = ModelRegistry::new();
        registry.publish(model("m1"));
        let held = registry.get().unwrap();

        registry.publish(model("m2"));

        assert_eq!(held.version, "m1");
        assert_eq!(registry.get().unwrap().version, "m2");
    }

    #[test]
    fn test_superseded_model_dropped_after_last_reader() {
        let registry = ModelRegistry::new();
        let first = registry.publish(model("m1"));
        let weak = Arc::downgrade(&first);
        drop(first);

        registry.publish(model("m2"));
        assert!(weak.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_subscribers_observe_publish() {
        let registry = ModelRegistry::new();
        let mut rx = registry.subscribe();

        registry.publish(model("m1"));
        rx.changed().await.unwrap();
        let seen = rx.borrow().as_ref().map(|m| m.version.clone());
        assert_eq!(seen.as_deref(), Some("m1"));
    }

    #[test]
    fn test_publish_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("model.json");
        artifact::save_model(&model("persisted"), &path).unwrap();

        let registry = ModelRegistry::new();
        registry.publish_file(&path).unwrap();
        assert_eq!(registry.current_version().as_deref(), Some("persisted"));
    }

    #[test]
    fn test_publish_file_failure_keeps_current() {
        let temp_dir = TempDir::new().unwrap();
        let registry = ModelRegistry::new();
        registry.publish(model("m1"));

        assert!(registry
            .publish_file(&temp_dir.path().join("missing.json"))
            .is_err());
        assert_eq!(registry.current_version().as_deref(), Some("m1"));
    }
}
