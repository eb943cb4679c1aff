//! Scoring capability consumed by the serving path

use crate::types::frame::Frame;
use thiserror::Error;

/// Errors that can occur with a scorer
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScorerError {
    #[error("Model not trained")]
    NotTrained,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("feature mismatch: model expects {expected:?}, got {found:?}")]
    FeatureMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Prediction failed: {0}")]
    PredictionFailed(String),
}

/// A trained binary classifier producing fraud probabilities.
///
/// Implementations are immutable once trained, so a single instance is shared
/// across request tasks without locking.
pub trait Scorer: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Probability of the positive (fraud) class for every row, in row order
    fn predict_proba(&self, features: &Frame) -> Result<Vec<f64>, ScorerError>;

    /// Input columns in the order the scorer was trained on, when it records them
    fn feature_names(&self) -> Option<&[String]> {
        None
    }
}
