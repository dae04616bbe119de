//! Sentinel - API request anomaly detection server
//!
//! Reads recent request logs from PostgreSQL (or synthetic traffic in demo
//! mode), retrains an isolation forest on a fixed schedule and serves
//! anomaly statistics over HTTP.

use anyhow::{Context, Result};
use sentinel_lib::{
    detector::{ModelRegistry, ModelTrainer, RetrainScheduler, RANDOM_SEED},
    health::{components, HealthRegistry},
    observability::{DetectorMetrics, StructuredLogger},
    store::{InMemoryLogStore, LogStore, PgLogStore},
    synthetic::TrafficGenerator,
};
use sentinel_server::api::{self, AppState, Windows};
use sentinel_server::config::ServerConfig;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting sentinel");

    let config = ServerConfig::load()?;
    info!(
        api_port = config.api_port,
        demo_mode = config.demo_mode,
        model_path = %config.model_path,
        "Sentinel configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::STORE).await;
    health_registry.register(components::SCHEDULER).await;
    health_registry
        .set_degraded(components::MODEL, "no model published yet")
        .await;

    let metrics = DetectorMetrics::new();
    let logger = StructuredLogger::new("sentinel");

    let store: Arc<dyn LogStore> = if config.demo_mode {
        let records = TrafficGenerator::new(RANDOM_SEED).reference_dataset();
        info!(records = records.len(), "Demo mode: serving synthetic traffic");
        Arc::new(InMemoryLogStore::new(records))
    } else {
        let store = PgLogStore::connect(&config.database_url, config.retry_policy())
            .await
            .context("Failed to connect to the log store")?;
        Arc::new(store)
    };

    let registry = Arc::new(ModelRegistry::new());
    let model_path = config.model_path();
    if model_path.exists() {
        match registry.publish_file(&model_path) {
            Ok(snapshot) => {
                metrics.set_model_version(&snapshot.version);
                health_registry.model_published(&snapshot.version).await;
            }
            Err(e) => warn!(error = %format!("{:#}", e), "Ignoring unreadable model artifact"),
        }
    }

    let scheduler = Arc::new(
        RetrainScheduler::new(
            Arc::new(ModelTrainer::new()),
            store.clone(),
            registry.clone(),
            config.retrain_config(),
        )
        .with_metrics(metrics.clone())
        .with_logger(logger.clone())
        .with_health(health_registry.clone()),
    );

    let (shutdown_tx, _) = broadcast::channel(1);
    let scheduler_handle = tokio::spawn(Arc::clone(&scheduler).run(shutdown_tx.subscribe()));

    let app_state = Arc::new(
        AppState::new(
            health_registry.clone(),
            metrics.clone(),
            store,
            registry.clone(),
            scheduler,
        )
        .with_windows(Windows {
            stats: config.stats_window,
            report: config.report_window,
        }),
    );

    logger.log_startup(
        SERVER_VERSION,
        registry.current_version().as_deref(),
        config.demo_mode,
    );

    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    let _ = shutdown_tx.send(());
    scheduler_handle.await?;
    api_handle.await??;

    info!("Shutdown complete");
    Ok(())
}
