//! Binary classification metrics for the held-out set

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

const CLASS_NAMES: [&str; 2] = ["Not Fraud", "Fraud"];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("no samples to evaluate")]
    Empty,

    #[error("length mismatch: {y_true} labels, {other} predictions")]
    LengthMismatch { y_true: usize, other: usize },
}

/// Headline metrics logged to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Absent when the labels hold a single class
    pub roc_auc: Option<f64>,
}

impl EvaluationMetrics {
    pub fn as_map(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::from([
            ("accuracy".to_string(), self.accuracy),
            ("precision".to_string(), self.precision),
            ("recall".to_string(), self.recall),
            ("f1".to_string(), self.f1),
        ]);
        if let Some(auc) = self.roc_auc {
            map.insert("roc_auc".to_string(), auc);
        }
        map
    }
}

/// Counts of a 2x2 confusion matrix, fraud as the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_positives: usize,
}

impl ConfusionMatrix {
    pub fn total(&self) -> usize {
        self.true_negatives + self.false_positives + self.false_negatives + self.true_positives
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_negatives + self.true_positives, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        f1(self.precision(), self.recall())
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>18} {:>20} {:>16}", "", "Predicted Not Fraud", "Predicted Fraud")?;
        writeln!(
            f,
            "{:>18} {:>20} {:>16}",
            "Actual Not Fraud", self.true_negatives, self.false_positives
        )?;
        write!(
            f,
            "{:>18} {:>20} {:>16}",
            "Actual Fraud", self.false_negatives, self.true_positives
        )
    }
}

/// Zero when the denominator is zero
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

fn check_lengths(y_true: &[u8], other: usize) -> Result<(), EvaluationError> {
    if y_true.is_empty() {
        return Err(EvaluationError::Empty);
    }
    if y_true.len() != other {
        return Err(EvaluationError::LengthMismatch {
            y_true: y_true.len(),
            other,
        });
    }
    Ok(())
}

pub fn confusion_matrix(y_true: &[u8], y_pred: &[u8]) -> Result<ConfusionMatrix, EvaluationError> {
    check_lengths(y_true, y_pred.len())?;

    let mut cm = ConfusionMatrix::default();
    for (&t, &p) in y_true.iter().zip(y_pred) {
        match (t != 0, p != 0) {
            (false, false) => cm.true_negatives += 1,
            (false, true) => cm.false_positives += 1,
            (true, false) => cm.false_negatives += 1,
            (true, true) => cm.true_positives += 1,
        }
    }
    Ok(cm)
}

/// Area under the ROC curve via the rank-sum statistic, averaging tied ranks.
///
/// Returns `None` unless both classes are present.
pub fn roc_auc_score(y_true: &[u8], scores: &[f64]) -> Result<Option<f64>, EvaluationError> {
    check_lengths(y_true, scores.len())?;

    let n_pos = y_true.iter().filter(|&&y| y != 0).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Ok(None);
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // 1-based ranks start+1..=end share their mean
        let mean_rank = (start + 1 + end) as f64 / 2.0;
        let positives = order[start..end].iter().filter(|&&i| y_true[i] != 0).count();
        positive_rank_sum += mean_rank * positives as f64;
        start = end;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Ok(Some(
        (positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg),
    ))
}

/// Accuracy, precision, recall and F1 for fraud, plus ROC AUC when scores are given
pub fn evaluate_model(
    y_true: &[u8],
    y_pred: &[u8],
    y_pred_proba: Option<&[f64]>,
) -> Result<EvaluationMetrics, EvaluationError> {
    let cm = confusion_matrix(y_true, y_pred)?;
    let roc_auc = match y_pred_proba {
        Some(scores) => roc_auc_score(y_true, scores)?,
        None => None,
    };

    Ok(EvaluationMetrics {
        accuracy: cm.accuracy(),
        precision: cm.precision(),
        recall: cm.recall(),
        f1: cm.f1(),
        roc_auc,
    })
}

/// One row of a [`ClassificationReport`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class precision, recall, F1 and support with macro and weighted averages
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub classes: [ClassScores; 2],
    pub accuracy: f64,
    pub macro_avg: ClassScores,
    pub weighted_avg: ClassScores,
}

pub fn classification_report(
    y_true: &[u8],
    y_pred: &[u8],
) -> Result<ClassificationReport, EvaluationError> {
    let cm = confusion_matrix(y_true, y_pred)?;

    let not_fraud_precision = ratio(cm.true_negatives, cm.true_negatives + cm.false_negatives);
    let not_fraud_recall = ratio(cm.true_negatives, cm.true_negatives + cm.false_positives);
    let classes = [
        ClassScores {
            precision: not_fraud_precision,
            recall: not_fraud_recall,
            f1: f1(not_fraud_precision, not_fraud_recall),
            support: cm.true_negatives + cm.false_positives,
        },
        ClassScores {
            precision: cm.precision(),
            recall: cm.recall(),
            f1: cm.f1(),
            support: cm.true_positives + cm.false_negatives,
        },
    ];

    let total = cm.total();
    let average = |weight: &dyn Fn(&ClassScores) -> f64| {
        let norm: f64 = classes.iter().map(weight).sum();
        let avg = |metric: fn(&ClassScores) -> f64| {
            if norm == 0.0 {
                0.0
            } else {
                classes.iter().map(|c| metric(c) * weight(c)).sum::<f64>() / norm
            }
        };
        ClassScores {
            precision: avg(|c| c.precision),
            recall: avg(|c| c.recall),
            f1: avg(|c| c.f1),
            support: total,
        }
    };

    let macro_avg = average(&|_| 1.0);
    let weighted_avg = average(&|c| c.support as f64);

    Ok(ClassificationReport {
        classes,
        accuracy: cm.accuracy(),
        macro_avg,
        weighted_avg,
    })
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let row = |f: &mut fmt::Formatter<'_>, name: &str, s: &ClassScores| {
            writeln!(
                f,
                "{:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, s.precision, s.recall, s.f1, s.support
            )
        };

        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for (name, scores) in CLASS_NAMES.iter().zip(&self.classes) {
            row(f, name, scores)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        row(f, "macro avg", &self.macro_avg)?;
        row(f, "weighted avg", &self.weighted_avg)
    }
}
