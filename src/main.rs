//! Fraud Detection Service - Main Entry Point
//!
//! Loads the trained artifacts, then serves predictions over HTTP until
//! interrupted.

use anyhow::{Context, Result};
use fraud_detection_service::{
    config::AppConfig,
    logging,
    metrics::{MetricsReporter, PredictionMetrics},
    models::ArtifactStore,
    serving::{self, ServingProcess},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Overrides the configuration file location
const CONFIG_ENV: &str = "FRAUD_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = match std::env::var(CONFIG_ENV) {
        Ok(path) => AppConfig::load_from_path(&path)
            .with_context(|| format!("failed to load configuration from {}", path))?,
        Err(_) => AppConfig::load().context("failed to load configuration")?,
    };

    logging::init(&config.logging)?;
    info!("Starting Fraud Detection Service");
    info!(
        models_dir = %config.models.models_dir.display(),
        threshold = config.detection.threshold,
        "Configuration loaded successfully"
    );

    // Load artifacts before accepting connections
    let metrics = Arc::new(PredictionMetrics::new());
    let process = Arc::new(ServingProcess::with_metrics(
        config.detection.threshold,
        metrics.clone(),
    ));
    let store = ArtifactStore::new(&config.models.models_dir);
    process
        .start(&store)
        .context("failed to load model artifacts")?;

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    info!(address = %address, "Listening");

    axum::serve(listener, serving::router(process.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Print final summary
    process.shutdown();
    metrics.log_summary();
    info!("Service stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
