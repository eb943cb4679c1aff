//! End-to-end training: load, split, fit, evaluate, persist, track

use crate::config::TrainingConfig;
use crate::feature_transform::{FeatureError, FeatureTransform};
use crate::models::artifacts::{ArtifactError, ArtifactStore};
use crate::models::gbm::{GbmParams, GradientBoostingClassifier};
use crate::models::scorer::{Scorer, ScorerError};
use crate::training::data::{load_data, split_data, DataError};
use crate::training::evaluate::{
    classification_report, confusion_matrix, evaluate_model, ConfusionMatrix, EvaluationError,
    EvaluationMetrics,
};
use crate::training::tracking::{ExperimentTracker, Run, RunStatus, TrackingError};
use crate::types::frame::Frame;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Probability above which a held-out row is labelled fraud during evaluation
const EVALUATION_THRESHOLD: f64 = 0.5;

/// A training run failure, tagged with the step that failed
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("data step failed: {0}")]
    Data(#[from] DataError),

    #[error("feature step failed: {0}")]
    Features(#[from] FeatureError),

    #[error("model training failed: {0}")]
    Model(#[from] ScorerError),

    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("saving artifacts failed: {0}")]
    Artifacts(#[from] ArtifactError),

    #[error("experiment tracking failed: {0}")]
    Tracking(#[from] TrackingError),
}

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub run_id: Uuid,
    pub metrics: EvaluationMetrics,
    pub confusion: ConfusionMatrix,
    pub artifacts_dir: PathBuf,
}

/// Fit a classifier on transformed features
pub fn train_model(
    x: &Frame,
    y: &[u8],
    params: &GbmParams,
) -> Result<GradientBoostingClassifier, ScorerError> {
    let mut model = GradientBoostingClassifier::with_params(params.clone());
    model.fit(x, y)?;
    Ok(model)
}

pub struct TrainingPipeline {
    config: TrainingConfig,
}

impl TrainingPipeline {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train on the configured CSV source
    pub fn run(&self) -> Result<TrainingOutcome, TrainingError> {
        let frame = load_data(&self.config.data.source)?;
        self.run_on_frame(&frame)
    }

    /// Train on an in-memory dataset that still carries the target column
    pub fn run_on_frame(&self, frame: &Frame) -> Result<TrainingOutcome, TrainingError> {
        let tracking = &self.config.training;
        let tracker = ExperimentTracker::new(&tracking.tracking_dir, &tracking.experiment_name);
        let mut run = tracker.start_run(&tracking.registered_model_name)?;

        match self.execute(frame, &mut run) {
            Ok(outcome) => {
                run.finish(RunStatus::Finished)?;
                Ok(outcome)
            }
            Err(e) => {
                error!(run_id = %run.id(), error = %e, "Training run failed");
                if let Err(tracking_err) = run.finish(RunStatus::Failed) {
                    warn!(error = %tracking_err, "Failed to close tracking run");
                }
                Err(e)
            }
        }
    }

    fn execute(&self, frame: &Frame, run: &mut Run) -> Result<TrainingOutcome, TrainingError> {
        let config = &self.config;
        let params = &config.model.params;

        run.log_params(params)?;
        run.log_param("test_size", config.data.test_size)?;
        run.log_param("split_random_state", config.data.random_state)?;
        run.log_param("scale_features", &config.features.scale_features)?;

        let split = split_data(
            frame,
            &config.features.target,
            config.data.test_size,
            config.data.random_state,
        )?;

        let mut transform = FeatureTransform::new(config.features.scale_features.clone());
        let x_train = transform.fit_transform(&split.x_train)?;
        let x_test = transform.transform(&split.x_test)?;

        info!(
            rows = x_train.len(),
            features = x_train.num_columns(),
            n_estimators = params.n_estimators,
            max_depth = params.max_depth,
            "Training model"
        );
        let start = Instant::now();
        let model = train_model(&x_train, &split.y_train, params)?;
        info!(elapsed_ms = start.elapsed().as_millis() as u64, "Model trained");

        let y_proba = model.predict_proba(&x_test)?;
        let y_pred: Vec<u8> = y_proba
            .iter()
            .map(|&p| u8::from(p > EVALUATION_THRESHOLD))
            .collect();

        let metrics = evaluate_model(&split.y_test, &y_pred, Some(y_proba.as_slice()))?;
        let confusion = confusion_matrix(&split.y_test, &y_pred)?;
        let report = classification_report(&split.y_test, &y_pred)?;

        info!(
            accuracy = metrics.accuracy,
            precision = metrics.precision,
            recall = metrics.recall,
            f1 = metrics.f1,
            roc_auc = ?metrics.roc_auc,
            "Evaluation metrics"
        );
        info!("Confusion matrix:\n{}", confusion);
        info!("Classification report:\n{}", report);

        let store = ArtifactStore::new(&config.training.output_dir);
        store.save(&transform, &model)?;

        run.log_metrics(&metrics.as_map())?;
        run.log_artifacts(store.dir())?;

        Ok(TrainingOutcome {
            run_id: run.id(),
            metrics,
            confusion,
            artifacts_dir: store.dir().to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::artifacts::ArtifactLoader;
    use crate::models::inference::InferenceEngine;
    use crate::types::transaction::{Transaction, FIELD_NAMES};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::fs;

    /// Creditcard-shaped frame where fraud rows have shifted V14 and large amounts
    fn synthetic_frame(rows: usize, seed: u64) -> Frame {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut columns = vec!["Time"];
        columns.extend(FIELD_NAMES);
        columns.push("Class");

        let data = (0..rows)
            .map(|i| {
                let fraud = i % 10 == 0;
                let mut row = vec![i as f64];
                for v in 1..=28 {
                    let shift = if fraud && v == 14 { -4.0 } else { 0.0 };
                    row.push(rng.gen_range(-1.0..1.0) + shift);
                }
                let amount = if fraud {
                    rng.gen_range(500.0..2000.0)
                } else {
                    rng.gen_range(1.0..200.0)
                };
                row.push(amount);
                row.push(if fraud { 1.0 } else { 0.0 });
                row
            })
            .collect();

        Frame::from_columns(&columns, data).unwrap()
    }

    fn config(root: &std::path::Path) -> TrainingConfig {
        let mut config = TrainingConfig::default();
        config.training.tracking_dir = root.join("mlruns");
        config.training.output_dir = root.join("models");
        config.training.experiment_name = "test".to_string();
        config.model.params = GbmParams {
            n_estimators: 20,
            max_depth: 3,
            learning_rate: 0.3,
            ..GbmParams::default()
        };
        config
    }

    #[test]
    fn test_pipeline_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = TrainingPipeline::new(config(dir.path()));

        let outcome = pipeline.run_on_frame(&synthetic_frame(400, 1)).unwrap();

        assert!(outcome.metrics.accuracy > 0.9);
        assert!(outcome.metrics.recall > 0.8);
        assert!(outcome.metrics.roc_auc.unwrap() > 0.9);
        assert_eq!(outcome.confusion.total(), 80);

        // Artifacts load back into a working engine
        let store = ArtifactStore::new(&outcome.artifacts_dir);
        let engine = InferenceEngine::new(store.load_artifacts().unwrap(), 0.5);
        let mut values = [0.0; 29];
        values[13] = -4.0;
        values[28] = 1500.0;
        assert!(engine.predict(&Transaction::from_values(values)).unwrap().is_fraud);

        // Tracker run is complete
        let run_dir = dir
            .path()
            .join("mlruns/test")
            .join(outcome.run_id.to_string());
        let meta: serde_json::Value =
            serde_json::from_slice(&fs::read(run_dir.join("meta.json")).unwrap()).unwrap();
        assert_eq!(meta["status"], "FINISHED");
        assert!(run_dir.join("metrics.json").is_file());
        assert!(run_dir.join("artifacts/model.json").is_file());
        assert!(run_dir.join("artifacts/feature_engineer.json").is_file());
    }

    #[test]
    fn test_failed_run_writes_no_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.features.target = "Label".to_string();
        let pipeline = TrainingPipeline::new(config);

        let err = pipeline.run_on_frame(&synthetic_frame(100, 2)).unwrap_err();
        assert!(matches!(err, TrainingError::Data(_)));
        assert!(!dir.path().join("models").exists());

        let experiment_dir = dir.path().join("mlruns/test");
        let run_dir = fs::read_dir(&experiment_dir)
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        let meta: serde_json::Value =
            serde_json::from_slice(&fs::read(run_dir.join("meta.json")).unwrap()).unwrap();
        assert_eq!(meta["status"], "FAILED");
    }

    #[test]
    fn test_run_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.data.source = dir.path().join("missing.csv");

        assert!(matches!(
            TrainingPipeline::new(config).run(),
            Err(TrainingError::Data(DataError::Read { .. }))
        ));
    }

    #[test]
    fn test_train_model_rejects_bad_params() {
        let frame = Frame::from_columns(&["Amount"], vec![vec![1.0], vec![2.0]]).unwrap();
        let params = GbmParams {
            n_estimators: 0,
            ..GbmParams::default()
        };
        assert!(matches!(
            train_model(&frame, &[0, 1], &params),
            Err(ScorerError::InvalidParams(_))
        ));
    }
}
