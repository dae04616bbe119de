//! Component health for the detection service
//!
//! Tracks the log store, the model and the retraining scheduler. The
//! service is live while no component is unhealthy and ready once a model
//! has been published.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Component names for health tracking
pub mod components {
    pub const STORE: &str = "store";
    pub const MODEL: &str = "model";
    pub const SCHEDULER: &str = "scheduler";
}

/// Health status of a component, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still serving, e.g. scoring with the last model while the store is down
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: Utc::now().timestamp(),
        }
    }
}

/// Body of the liveness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Body of the readiness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    components: BTreeMap<String, ComponentHealth>,
    model_version: Option<String>,
}

/// Shared, clonable view of component health
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<State>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `name` as healthy
    pub async fn register(&self, name: &str) {
        self.set(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_healthy(&self, name: &str) {
        self.set(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.set(name, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.set(name, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    /// Record a newly active model; the service is ready from now on
    pub async fn model_published(&self, version: &str) {
        let mut state = self.state.write().await;
        state.model_version = Some(version.to_string());
        state.components.insert(
            components::MODEL.to_string(),
            ComponentHealth::new(ComponentStatus::Healthy, None),
        );
    }

    async fn set(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        self.state
            .write()
            .await
            .components
            .insert(name.to_string(), ComponentHealth::new(status, message));
    }

    /// Worst component status plus every component's detail
    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);

        HealthResponse {
            status,
            components: state.components.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        let unhealthy = state
            .components
            .values()
            .any(|c| c.status == ComponentStatus::Unhealthy);

        let reason = match (&state.model_version, unhealthy) {
            (None, _) => Some("No model published yet"),
            (Some(_), true) => Some("Critical component unhealthy"),
            (Some(_), false) => None,
        };

        ReadinessResponse {
            ready: reason.is_none(),
            model_version: state.model_version.clone(),
            reason: reason.map(str::to_string),
        }
    }
}
