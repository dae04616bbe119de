//! HTTP API: dashboard statistics, report download, manual training,
//! health checks and Prometheus metrics

use crate::report::{self, REPORT_RECENT_ANOMALIES};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use sentinel_lib::{
    clock::{Clock, SystemClock},
    detector::{
        AnomalyScorer, CycleOutcome, ModelRegistry, RetrainScheduler, ScorerConfig,
        DEFAULT_TOP_OFFENDERS,
    },
    health::{components, ComponentStatus, HealthRegistry},
    observability::{DetectorMetrics, StructuredLogger},
    store::LogStore,
    AlertTracker, AnomalyEntry, DetectionError, LogRecord, OffenderCount, ScoreReport, StoreError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Log windows scored per endpoint
#[derive(Debug, Clone, Copy)]
pub struct Windows {
    pub stats: usize,
    pub report: usize,
}

impl Default for Windows {
    fn default() -> Self {
        Self {
            stats: 1000,
            report: 2000,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: DetectorMetrics,
    pub store: Arc<dyn LogStore>,
    pub registry: Arc<ModelRegistry>,
    pub scheduler: Arc<RetrainScheduler>,
    pub scorer: Arc<AnomalyScorer>,
    pub report_scorer: Arc<AnomalyScorer>,
    pub windows: Windows,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: DetectorMetrics,
        store: Arc<dyn LogStore>,
        registry: Arc<ModelRegistry>,
        scheduler: Arc<RetrainScheduler>,
    ) -> Self {
        let alerts = Arc::new(AlertTracker::new());
        let scorer = AnomalyScorer::new(registry.clone(), alerts.clone())
            .with_metrics(metrics.clone())
            .with_logger(StructuredLogger::new("sentinel"));
        let report_scorer =
            AnomalyScorer::new(registry.clone(), alerts).with_config(ScorerConfig {
                top_offenders: DEFAULT_TOP_OFFENDERS,
                recent_anomalies: REPORT_RECENT_ANOMALIES,
            });

        Self {
            health_registry,
            metrics,
            store,
            registry,
            scheduler,
            scorer: Arc::new(scorer),
            report_scorer: Arc::new(report_scorer),
            windows: Windows::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_windows(mut self, windows: Windows) -> Self {
        self.windows = windows;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Body of every non-success response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusBody {
    pub status: String,
    pub message: String,
}

/// Failure of an API request, mapped onto an HTTP status
#[derive(Debug)]
pub enum ApiError {
    NotReady,
    NoData { status: StatusCode },
    Store(String),
    Internal(String),
}

impl ApiError {
    fn from_detection(err: DetectionError, no_data_status: StatusCode) -> Self {
        match err {
            DetectionError::ModelNotReady => ApiError::NotReady,
            DetectionError::DataUnavailable { .. } => ApiError::NoData {
                status: no_data_status,
            },
            DetectionError::StoreConnection(message) => ApiError::Store(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, status, message) = match self {
            ApiError::NotReady => (
                StatusCode::SERVICE_UNAVAILABLE,
                "not_ready",
                "The model is still training, please retry shortly".to_string(),
            ),
            ApiError::NoData { status } => {
                (status, "no_data", "No request logs to analyse".to_string())
            }
            ApiError::Store(message) => (StatusCode::BAD_GATEWAY, "store_unavailable", message),
            ApiError::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "error", message)
            }
        };

        (
            code,
            Json(StatusBody {
                status: status.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

/// Dashboard statistics over the most recent requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_requests: usize,
    pub total_anomalies: usize,
    pub anomalies_percentage: f64,
    pub top_ips: Vec<OffenderCount>,
    pub recent_anomalies: Vec<AnomalyEntry>,
    pub new_alerts: Vec<String>,
    pub model_version: String,
}

impl From<ScoreReport> for StatsResponse {
    fn from(report: ScoreReport) -> Self {
        Self {
            total_requests: report.total,
            total_anomalies: report.anomaly_count,
            anomalies_percentage: report.anomaly_percentage,
            top_ips: report.top_offenders,
            recent_anomalies: report.recent_anomalies,
            new_alerts: report.new_alerts,
            model_version: report.model_version,
        }
    }
}

/// Result of a manual training request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<CycleOutcome> for TrainResponse {
    fn from(outcome: CycleOutcome) -> Self {
        match outcome {
            CycleOutcome::Published { version, samples } => Self {
                success: true,
                version: Some(version),
                samples: Some(samples),
                reason: None,
            },
            CycleOutcome::Skipped { reason } => Self {
                success: false,
                version: None,
                samples: None,
                reason: Some(reason),
            },
        }
    }
}

async fn fetch_window(state: &AppState, limit: usize) -> Result<Vec<LogRecord>, ApiError> {
    match state.store.fetch_recent(limit).await {
        Ok(batch) => {
            state.health_registry.set_healthy(components::STORE).await;
            if batch.rejected > 0 {
                warn!(rejected = batch.rejected, "Skipped malformed log rows");
            }
            Ok(batch.records)
        }
        Err(e) => {
            state
                .health_registry
                .set_degraded(components::STORE, e.to_string())
                .await;
            Err(e.into())
        }
    }
}

/// Score the stats window, surfacing offenders not alerted before
async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>, ApiError> {
    let records = fetch_window(&state, state.windows.stats).await?;
    let report = state.scorer.score(&records).map_err(|e| {
        if !e.is_transient() {
            error!(error = %e, "Scoring failed");
        }
        ApiError::from_detection(e, StatusCode::OK)
    })?;
    Ok(Json(StatsResponse::from(report)))
}

/// Score the report window and return it as a text attachment
async fn download_report(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let records = fetch_window(&state, state.windows.report).await?;
    let scored = state
        .report_scorer
        .inspect(&records)
        .map_err(|e| ApiError::from_detection(e, StatusCode::NOT_FOUND))?;

    let now = state.clock.now();
    let body = report::render_report(&scored, now);
    let disposition = format!(
        "attachment; filename=\"{}\"",
        report::report_filename(now)
    );

    info!(
        total = scored.total,
        anomalies = scored.anomaly_count,
        "Generated security report"
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Run one training cycle now
async fn train(State(state): State<Arc<AppState>>) -> Json<TrainResponse> {
    let outcome = state.scheduler.trigger().await;
    info!(success = outcome.is_published(), "Manual training requested");
    Json(TrainResponse::from(outcome))
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Ready once a model is available
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready && state.registry.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return ApiError::Internal(e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/stats", get(stats))
        .route("/api/report/download", get(download_report))
        .route("/api/train", post(train))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the API until `shutdown` fires
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
