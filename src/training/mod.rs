//! Offline training: dataset handling, evaluation, tracking and the pipeline

pub mod data;
pub mod evaluate;
pub mod pipeline;
pub mod tracking;

pub use data::{load_data, split_data, DataError, TrainTestSplit};
pub use evaluate::{EvaluationError, EvaluationMetrics};
pub use pipeline::{train_model, TrainingError, TrainingOutcome, TrainingPipeline};
pub use tracking::{ExperimentTracker, RunStatus, TrackingError};
