//! ML model components: scorer capability, boosted trees, artifacts, inference

pub mod artifacts;
pub mod gbm;
pub mod inference;
pub mod scorer;

pub use artifacts::{ArtifactError, ArtifactLoader, ArtifactStore, ModelArtifacts};
pub use gbm::{GbmParams, GradientBoostingClassifier};
pub use inference::{InferenceEngine, InferenceError, PredictionResult, DEFAULT_THRESHOLD};
pub use scorer::{Scorer, ScorerError};
