//! Single-transaction inference: feature transform, scorer, decision threshold

use crate::feature_transform::FeatureError;
use crate::models::artifacts::ModelArtifacts;
use crate::models::scorer::ScorerError;
use crate::types::frame::Frame;
use crate::types::transaction::Transaction;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Probability above which a transaction is flagged as fraud
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Errors from the transform + scoring path
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("feature transform failed: {0}")]
    Transform(#[from] FeatureError),

    #[error("scorer failed: {0}")]
    Scorer(#[from] ScorerError),

    #[error("scorer returned {found} probabilities for {expected} rows")]
    OutputLength { expected: usize, found: usize },

    #[error("scorer returned an invalid probability: {0}")]
    InvalidProbability(f64),
}

/// Result of model inference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub is_fraud: bool,
    pub fraud_probability: f64,
}

impl PredictionResult {
    /// Flag is set only when the probability is strictly above the threshold
    pub fn from_probability(fraud_probability: f64, threshold: f64) -> Self {
        Self {
            is_fraud: fraud_probability > threshold,
            fraud_probability,
        }
    }
}

/// Inference engine over a loaded transform/scorer pair.
///
/// Immutable after construction; shared between request tasks behind an `Arc`.
pub struct InferenceEngine {
    artifacts: ModelArtifacts,
    threshold: f64,
}

impl InferenceEngine {
    pub fn new(artifacts: ModelArtifacts, threshold: f64) -> Self {
        Self {
            artifacts,
            threshold,
        }
    }

    pub fn scorer_name(&self) -> &str {
        self.artifacts.scorer.name()
    }

    /// Score one transaction
    pub fn predict(&self, transaction: &Transaction) -> Result<PredictionResult, InferenceError> {
        self.predict_frame(&transaction.to_frame())?
            .pop()
            .ok_or(InferenceError::OutputLength {
                expected: 1,
                found: 0,
            })
    }

    /// Score every row of an untransformed frame
    pub fn predict_frame(&self, rows: &Frame) -> Result<Vec<PredictionResult>, InferenceError> {
        let features = self.artifacts.transform.transform(rows)?;
        let probabilities = self.artifacts.scorer.predict_proba(&features)?;

        if probabilities.len() != rows.len() {
            return Err(InferenceError::OutputLength {
                expected: rows.len(),
                found: probabilities.len(),
            });
        }

        probabilities
            .into_iter()
            .map(|p| {
                if !(0.0..=1.0).contains(&p) {
                    return Err(InferenceError::InvalidProbability(p));
                }
                let result = PredictionResult::from_probability(p, self.threshold);
                debug!(
                    scorer = %self.scorer_name(),
                    probability = p,
                    is_fraud = result.is_fraud,
                    "Inference complete"
                );
                Ok(result)
            })
            .collect()
    }
}
