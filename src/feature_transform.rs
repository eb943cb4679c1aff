//! Feature transform applied before scoring.
//!
//! Standard-scales a configured set of columns with statistics captured at
//! fit time and drops the `Time` column. The same fitted instance is applied
//! to the test split during training and to every live request, so scaling
//! never depends on what else happens to be in the batch.

use crate::types::frame::Frame;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Column removed on transform; it is not part of the serving schema.
pub const TIME_COLUMN: &str = "Time";

/// Default columns to standard-scale
pub const DEFAULT_SCALE_FEATURES: [&str; 1] = ["Amount"];

/// Errors raised by [`FeatureTransform`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("FeatureTransform must be fitted before transform")]
    NotFitted,

    #[error("column {0} is required by the feature transform but missing from the input")]
    MissingColumn(String),

    #[error("cannot fit on an empty frame")]
    EmptyInput,
}

/// Fitted scaling statistics for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingParams {
    pub feature: String,
    pub mean: f64,
    /// Population standard deviation, or `1.0` for a constant column
    pub scale: f64,
}

/// Stateful scaling + column pruning step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTransform {
    scale_features: Vec<String>,
    params: Option<Vec<ScalingParams>>,
}

impl FeatureTransform {
    /// Unfitted transform scaling the given columns
    pub fn new(scale_features: Vec<String>) -> Self {
        Self {
            scale_features,
            params: None,
        }
    }

    /// Compute mean and standard deviation of each scale-feature
    pub fn fit(&mut self, rows: &Frame) -> Result<&mut Self, FeatureError> {
        if rows.is_empty() {
            return Err(FeatureError::EmptyInput);
        }

        let mut params = Vec::with_capacity(self.scale_features.len());
        for feature in &self.scale_features {
            let values = rows
                .column(feature)
                .ok_or_else(|| FeatureError::MissingColumn(feature.clone()))?;

            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
            let std_dev = variance.sqrt();

            params.push(ScalingParams {
                feature: feature.clone(),
                mean,
                scale: if std_dev > 0.0 { std_dev } else { 1.0 },
            });
        }

        self.params = Some(params);
        Ok(self)
    }

    /// Apply the fitted scaling and drop `Time`. The input is left untouched.
    pub fn transform(&self, rows: &Frame) -> Result<Frame, FeatureError> {
        let params = self.params.as_ref().ok_or(FeatureError::NotFitted)?;

        let mut out = rows.clone();
        for p in params {
            let idx = out
                .column_index(&p.feature)
                .ok_or_else(|| FeatureError::MissingColumn(p.feature.clone()))?;
            let (mean, scale) = (p.mean, p.scale);
            out.map_column(idx, |x| (x - mean) / scale);
        }

        Ok(out.drop_column(TIME_COLUMN))
    }

    /// Fit and transform in one step (training only)
    pub fn fit_transform(&mut self, rows: &Frame) -> Result<Frame, FeatureError> {
        self.fit(rows)?.transform(rows)
    }

    pub fn is_fitted(&self) -> bool {
        self.params.is_some()
    }

    pub fn scale_features(&self) -> &[String] {
        &self.scale_features
    }

    /// Fitted statistics, if any
    pub fn params(&self) -> Option<&[ScalingParams]> {
        self.params.as_deref()
    }
}

impl Default for FeatureTransform {
    fn default() -> Self {
        Self::new(DEFAULT_SCALE_FEATURES.iter().map(|f| f.to_string()).collect())
    }
}
