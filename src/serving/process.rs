//! Serving process lifecycle and the prediction path behind the HTTP routes

use crate::metrics::{Outcome, PredictionMetrics};
use crate::models::artifacts::{ArtifactError, ArtifactLoader};
use crate::models::inference::{InferenceEngine, InferenceError, PredictionResult};
use crate::types::transaction::Transaction;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

/// Lifecycle of a serving process.
///
/// `Unstarted -> Loading -> Ready -> ShuttingDown -> Stopped`, with
/// `Loading -> Failed` when the artifacts cannot be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unstarted,
    Loading,
    Ready,
    Failed,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Unstarted => "unstarted",
            Lifecycle::Loading => "loading",
            Lifecycle::Ready => "ready",
            Lifecycle::Failed => "failed",
            Lifecycle::ShuttingDown => "shutting_down",
            Lifecycle::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ServingError {
    #[error("model not loaded")]
    NotReady,

    #[error("cannot {action} while {from}")]
    InvalidTransition { from: Lifecycle, action: &'static str },

    #[error("failed to load model artifacts: {0}")]
    Startup(#[from] ArtifactError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub model_loaded: bool,
}

struct Inner {
    lifecycle: Lifecycle,
    engine: Option<Arc<InferenceEngine>>,
}

/// Holds the loaded artifacts and telemetry for one service instance.
///
/// Shared by request handlers as `Arc<ServingProcess>`. The lock only guards
/// the lifecycle cell; scoring runs on a cloned `Arc<InferenceEngine>`.
pub struct ServingProcess {
    inner: RwLock<Inner>,
    threshold: f64,
    metrics: Arc<PredictionMetrics>,
}

impl ServingProcess {
    pub fn new(threshold: f64) -> Self {
        Self::with_metrics(threshold, Arc::new(PredictionMetrics::new()))
    }

    pub fn with_metrics(threshold: f64, metrics: Arc<PredictionMetrics>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                lifecycle: Lifecycle::Unstarted,
                engine: None,
            }),
            threshold,
            metrics,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.read().lifecycle
    }

    pub fn metrics(&self) -> &Arc<PredictionMetrics> {
        &self.metrics
    }

    /// Load artifacts once and move to `Ready`, or to `Failed` on error
    pub fn start(&self, loader: &dyn ArtifactLoader) -> Result<(), ServingError> {
        {
            let mut inner = self.write();
            if inner.lifecycle != Lifecycle::Unstarted {
                return Err(ServingError::InvalidTransition {
                    from: inner.lifecycle,
                    action: "start",
                });
            }
            inner.lifecycle = Lifecycle::Loading;
        }

        info!("Loading model artifacts");
        match loader.load_artifacts() {
            Ok(artifacts) => {
                let engine = InferenceEngine::new(artifacts, self.threshold);
                info!(
                    scorer = engine.scorer_name(),
                    threshold = self.threshold,
                    "Model artifacts loaded"
                );

                let mut inner = self.write();
                inner.engine = Some(Arc::new(engine));
                inner.lifecycle = Lifecycle::Ready;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to load model artifacts");
                self.write().lifecycle = Lifecycle::Failed;
                Err(e.into())
            }
        }
    }

    pub fn health(&self) -> HealthReport {
        let inner = self.read();
        let model_loaded = inner.engine.is_some();
        let healthy = inner.lifecycle == Lifecycle::Ready && model_loaded;
        HealthReport {
            status: if healthy { "healthy" } else { "unhealthy" },
            model_loaded,
        }
    }

    /// Score a validated transaction and record it in the telemetry
    pub fn predict(&self, transaction: &Transaction) -> Result<PredictionResult, ServingError> {
        let engine = {
            let inner = self.read();
            match (&inner.lifecycle, &inner.engine) {
                (Lifecycle::Ready, Some(engine)) => engine.clone(),
                _ => return Err(ServingError::NotReady),
            }
        };

        let start = Instant::now();
        let result = engine.predict(transaction)?;
        self.metrics
            .record_prediction(Outcome::from(result.is_fraud), start.elapsed());

        Ok(result)
    }

    /// Release the artifacts. Idempotent once stopped.
    pub fn shutdown(&self) {
        let mut inner = self.write();
        match inner.lifecycle {
            Lifecycle::Stopped => return,
            Lifecycle::Ready => {
                inner.lifecycle = Lifecycle::ShuttingDown;
                info!("Serving process shutting down");
            }
            _ => {}
        }
        inner.engine = None;
        inner.lifecycle = Lifecycle::Stopped;
    }
}
