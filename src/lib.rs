//! Fraud Detection Service Library
//!
//! Card-transaction fraud scoring: an offline training pipeline that fits a
//! feature transform and a gradient-boosted classifier, and an HTTP service
//! that loads the pair and serves predictions.

pub mod config;
pub mod feature_transform;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod serving;
pub mod training;
pub mod types;

pub use config::{AppConfig, TrainingConfig};
pub use feature_transform::FeatureTransform;
pub use models::{ArtifactStore, InferenceEngine, PredictionResult};
pub use serving::ServingProcess;
pub use types::{Frame, Transaction};
