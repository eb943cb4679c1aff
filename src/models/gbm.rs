//! Gradient boosting classifier.
//!
//! Binary logistic loss with second-order (gradient + hessian) regression
//! trees, L2-regularized leaf weights and optional row subsampling. The whole
//! ensemble is a plain serde value, so a trained model round-trips through
//! JSON with no loss.

use crate::models::scorer::{Scorer, ScorerError};
use crate::types::frame::Frame;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Hessians are floored to keep leaf weights finite on saturated rows.
const MIN_HESSIAN: f64 = 1e-16;

/// GBM hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GbmParams {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Maximum depth of each tree
    pub max_depth: usize,
    /// Shrinkage applied to every leaf weight
    pub learning_rate: f64,
    /// Minimum hessian sum required in each child of a split
    pub min_child_weight: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    /// Fraction of rows sampled for each tree
    pub subsample: f64,
    /// Weight multiplier for positive rows, for imbalanced data
    pub scale_pos_weight: f64,
    /// Seed for row subsampling
    pub random_state: u64,
}

impl Default for GbmParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 6,
            learning_rate: 0.1,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            subsample: 1.0,
            scale_pos_weight: 1.0,
            random_state: 42,
        }
    }
}

impl GbmParams {
    pub fn validate(&self) -> Result<(), ScorerError> {
        let invalid = |msg: &str| Err(ScorerError::InvalidParams(msg.to_string()));

        if self.n_estimators == 0 {
            return invalid("n_estimators must be at least 1");
        }
        if !(self.learning_rate > 0.0) {
            return invalid("learning_rate must be positive");
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return invalid("subsample must be in (0, 1]");
        }
        if self.min_child_weight < 0.0 || self.reg_lambda < 0.0 {
            return invalid("min_child_weight and reg_lambda must be non-negative");
        }
        if !(self.scale_pos_weight > 0.0) {
            return invalid("scale_pos_weight must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Children are always stored after their parent, which rules out cycles
    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { value } if !value.is_finite() => {
                    return Err(format!("node {} has a non-finite leaf value", idx));
                }
                Node::Leaf { .. } => {}
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "node {} splits on feature {} of {}",
                            idx, feature, n_features
                        ));
                    }
                    if threshold.is_nan() {
                        return Err(format!("node {} has a NaN threshold", idx));
                    }
                    for &child in [left, right] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(format!("node {} links to invalid child {}", idx, child));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Trained model state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ensemble {
    feature_names: Vec<String>,
    /// Prior log-odds every prediction starts from
    base_score: f64,
    trees: Vec<Tree>,
}

/// Upper bound on histogram bins per feature; bin ids must fit a `u8`.
const MAX_BINS: usize = 256;

/// Candidate split thresholds for one feature.
///
/// With few distinct values the cuts are midpoints between neighbours, so
/// every exact split is available. Otherwise they are quantiles of the
/// observed values.
fn feature_cuts(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(f64::total_cmp);

    let mut distinct = values.clone();
    distinct.dedup();

    if distinct.len() <= MAX_BINS {
        return distinct
            .windows(2)
            .map(|w| {
                let mid = w[0] + (w[1] - w[0]) / 2.0;
                // Adjacent floats can round the midpoint down onto the lower value
                if mid > w[0] {
                    mid
                } else {
                    w[1]
                }
            })
            .collect();
    }

    let mut cuts: Vec<f64> = (1..MAX_BINS)
        .map(|k| values[k * values.len() / MAX_BINS])
        .filter(|&c| c > distinct[0])
        .collect();
    cuts.dedup();
    cuts
}

/// Training rows quantized to per-feature bins.
///
/// `bin(v)` is the number of cuts `<= v`, so `bin(v) <= b` exactly when
/// `v < cuts[b]`. Trees store the raw cut value and predict on raw features.
struct BinnedMatrix {
    n_features: usize,
    bins: Vec<u8>,
    cuts: Vec<Vec<f64>>,
}

impl BinnedMatrix {
    fn new(rows: &[Vec<f64>]) -> Self {
        let n_features = rows.first().map_or(0, |r| r.len());
        let cuts: Vec<Vec<f64>> = (0..n_features)
            .map(|f| feature_cuts(rows.iter().map(|r| r[f]).collect()))
            .collect();

        let mut bins = Vec::with_capacity(rows.len() * n_features);
        for row in rows {
            for (f, &v) in row.iter().enumerate() {
                bins.push(cuts[f].partition_point(|&c| c <= v) as u8);
            }
        }

        Self {
            n_features,
            bins,
            cuts,
        }
    }

    fn bin(&self, row: usize, feature: usize) -> usize {
        self.bins[row * self.n_features + feature] as usize
    }
}

struct SplitCandidate {
    feature: usize,
    bin: usize,
    gain: f64,
}

/// Grows a single regression tree on the current gradients
struct TreeBuilder<'a> {
    binned: &'a BinnedMatrix,
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a GbmParams,
    nodes: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    fn build(mut self, indices: Vec<usize>) -> Tree {
        self.grow(indices, 0);
        Tree { nodes: self.nodes }
    }

    fn leaf_weight(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.params.reg_lambda) * self.params.learning_rate
    }

    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let g: f64 = indices.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = indices.iter().map(|&i| self.hess[i]).sum();

        let node_id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_weight(g, h),
        });

        if depth >= self.params.max_depth || indices.len() < 2 {
            return node_id;
        }

        let Some(split) = self.best_split(&indices, g, h) else {
            return node_id;
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.binned.bin(i, split.feature) <= split.bin);

        let left = self.grow(left_idx, depth + 1);
        let right = self.grow(right_idx, depth + 1);
        self.nodes[node_id] = Node::Split {
            feature: split.feature,
            threshold: self.binned.cuts[split.feature][split.bin],
            left,
            right,
        };

        node_id
    }

    fn best_split(&self, indices: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let lambda = self.params.reg_lambda;
        let parent_score = g * g / (h + lambda);

        let mut best: Option<SplitCandidate> = None;

        for (feature, cuts) in self.binned.cuts.iter().enumerate() {
            if cuts.is_empty() {
                continue;
            }

            let mut hist_g = vec![0.0; cuts.len() + 1];
            let mut hist_h = vec![0.0; cuts.len() + 1];
            let mut hist_n = vec![0usize; cuts.len() + 1];
            for &i in indices {
                let b = self.binned.bin(i, feature);
                hist_g[b] += self.grad[i];
                hist_h[b] += self.hess[i];
                hist_n[b] += 1;
            }

            let (mut g_left, mut h_left, mut n_left) = (0.0, 0.0, 0);
            for bin in 0..cuts.len() {
                g_left += hist_g[bin];
                h_left += hist_h[bin];
                n_left += hist_n[bin];

                let (g_right, h_right) = (g - g_left, h - h_left);
                if n_left == 0
                    || n_left == indices.len()
                    || h_left < self.params.min_child_weight
                    || h_right < self.params.min_child_weight
                {
                    continue;
                }

                let gain = g_left * g_left / (h_left + lambda)
                    + g_right * g_right / (h_right + lambda)
                    - parent_score;

                if gain > best.as_ref().map_or(0.0, |b| b.gain) {
                    best = Some(SplitCandidate { feature, bin, gain });
                }
            }
        }

        best
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Gradient boosted tree classifier for binary fraud labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    params: GbmParams,
    model: Option<Ensemble>,
}

impl GradientBoostingClassifier {
    /// Create a new classifier with default parameters
    pub fn new() -> Self {
        Self::with_params(GbmParams::default())
    }

    /// Create a new classifier with custom parameters
    pub fn with_params(params: GbmParams) -> Self {
        Self {
            params,
            model: None,
        }
    }

    /// Train on a feature frame and 0/1 labels
    pub fn fit(&mut self, x: &Frame, y: &[u8]) -> Result<(), ScorerError> {
        self.params.validate()?;

        if x.is_empty() {
            return Err(ScorerError::InvalidData("Empty dataset".to_string()));
        }
        if x.len() != y.len() {
            return Err(ScorerError::InvalidData(format!(
                "{} rows but {} labels",
                x.len(),
                y.len()
            )));
        }
        if let Some(bad) = y.iter().find(|&&label| label > 1) {
            return Err(ScorerError::InvalidData(format!(
                "labels must be 0 or 1, found {}",
                bad
            )));
        }
        if x.rows().iter().flatten().any(|v| !v.is_finite()) {
            return Err(ScorerError::InvalidData(
                "features contain NaN or infinite values".to_string(),
            ));
        }

        let rows = x.rows();
        let n = rows.len();
        let weights: Vec<f64> = y
            .iter()
            .map(|&label| {
                if label == 1 {
                    self.params.scale_pos_weight
                } else {
                    1.0
                }
            })
            .collect();
        let targets: Vec<f64> = y.iter().map(|&label| label as f64).collect();

        let total_weight: f64 = weights.iter().sum();
        let positive_weight: f64 = weights.iter().zip(&targets).map(|(w, t)| w * t).sum();
        let prior = (positive_weight / total_weight).clamp(1e-6, 1.0 - 1e-6);
        let base_score = (prior / (1.0 - prior)).ln();

        info!(
            samples = n,
            features = x.num_columns(),
            positive_rate = prior,
            params = ?self.params,
            "Training gradient boosting classifier"
        );

        let binned = BinnedMatrix::new(rows);
        let mut rng = StdRng::seed_from_u64(self.params.random_state);
        let mut margins = vec![base_score; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut trees = Vec::with_capacity(self.params.n_estimators);

        for round in 0..self.params.n_estimators {
            for i in 0..n {
                let p = sigmoid(margins[i]);
                grad[i] = weights[i] * (p - targets[i]);
                hess[i] = weights[i] * (p * (1.0 - p)).max(MIN_HESSIAN);
            }

            let mut sample: Vec<usize> = if self.params.subsample < 1.0 {
                (0..n)
                    .filter(|_| rng.gen::<f64>() < self.params.subsample)
                    .collect()
            } else {
                (0..n).collect()
            };
            if sample.is_empty() {
                sample.push(rng.gen_range(0..n));
            }

            let tree = TreeBuilder {
                binned: &binned,
                grad: &grad,
                hess: &hess,
                params: &self.params,
                nodes: Vec::new(),
            }
            .build(sample);

            for (margin, row) in margins.iter_mut().zip(rows) {
                *margin += tree.predict_row(row);
            }

            if round % 10 == 0 {
                let logloss = margins
                    .iter()
                    .zip(&targets)
                    .map(|(&m, &t)| {
                        let p = sigmoid(m).clamp(1e-15, 1.0 - 1e-15);
                        -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
                    })
                    .sum::<f64>()
                    / n as f64;
                debug!(round, nodes = tree.nodes.len(), depth = tree.depth(), logloss, "Boosting round");
            }

            trees.push(tree);
        }

        self.model = Some(Ensemble {
            feature_names: x.columns().to_vec(),
            base_score,
            trees,
        });

        info!(trees = self.params.n_estimators, "Classifier training completed successfully");
        Ok(())
    }

    /// Predicted labels (probability above 0.5)
    pub fn predict(&self, x: &Frame) -> Result<Vec<u8>, ScorerError> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(|p| u8::from(p > 0.5))
            .collect())
    }

    pub fn params(&self) -> &GbmParams {
        &self.params
    }

    /// Check if the model is trained
    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    /// Check a deserialized ensemble before it is used for scoring
    pub fn validate(&self) -> Result<(), ScorerError> {
        let model = self.model.as_ref().ok_or(ScorerError::NotTrained)?;
        if !model.base_score.is_finite() {
            return Err(ScorerError::InvalidData(
                "base score is not finite".to_string(),
            ));
        }

        let n_features = model.feature_names.len();
        for (t, tree) in model.trees.iter().enumerate() {
            tree.validate(n_features)
                .map_err(|reason| ScorerError::InvalidData(format!("tree {}: {}", t, reason)))?;
        }
        Ok(())
    }
}

impl Default for GradientBoostingClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Scorer for GradientBoostingClassifier {
    fn name(&self) -> &str {
        "gradient_boosting"
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.model.as_ref().map(|m| m.feature_names.as_slice())
    }

    fn predict_proba(&self, features: &Frame) -> Result<Vec<f64>, ScorerError> {
        let model = self.model.as_ref().ok_or(ScorerError::NotTrained)?;

        if features.columns() != model.feature_names.as_slice() {
            return Err(ScorerError::FeatureMismatch {
                expected: model.feature_names.clone(),
                found: features.columns().to_vec(),
            });
        }

        Ok(features
            .rows()
            .iter()
            .map(|row| {
                let margin = model.base_score
                    + model.trees.iter().map(|t| t.predict_row(row)).sum::<f64>();
                sigmoid(margin)
            })
            .collect())
    }
}
