//! Binary classification metrics.

use core::cmp::Ordering;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Validation metric a study optimizes and the runner monitors.
///
/// Both are maximized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MonitoredMetric {
    /// Validation accuracy.
    #[default]
    #[serde(rename = "val_accuracy")]
    ValAccuracy,
    /// Validation ROC-AUC.
    #[serde(rename = "val_auc")]
    ValAuc,
}

impl MonitoredMetric {
    /// Name under which the metric is recorded in the ledger.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MonitoredMetric::ValAccuracy => "val_accuracy",
            MonitoredMetric::ValAuc => "val_auc",
        }
    }
}

impl core::fmt::Display for MonitoredMetric {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitoredMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "val_accuracy" => Ok(MonitoredMetric::ValAccuracy),
            "val_auc" => Ok(MonitoredMetric::ValAuc),
            other => Err(Error::Configuration(format!(
                "metric must be val_accuracy or val_auc, got '{other}'"
            ))),
        }
    }
}

/// Clamp applied to probabilities before taking logarithms.
const EPS: f64 = 1e-7;

/// Fraction of predictions on the right side of 0.5.
///
/// Returns 0.0 for empty input.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn accuracy(probabilities: &[f64], labels: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let correct = probabilities
        .iter()
        .zip(labels)
        .filter(|&(&p, &y)| (p >= 0.5) == (y >= 0.5))
        .count();
    correct as f64 / labels.len() as f64
}

/// Mean binary cross-entropy with probabilities clamped to `[ε, 1-ε]`.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn binary_cross_entropy(probabilities: &[f64], labels: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let total: f64 = probabilities
        .iter()
        .zip(labels)
        .map(|(&p, &y)| {
            let p = p.clamp(EPS, 1.0 - EPS);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();
    total / labels.len() as f64
}

/// Area under the ROC curve by the trapezoid rule.
///
/// Tied scores form a single ROC point. With only one class present the curve
/// is undefined and 0.5 is returned.
#[allow(clippy::cast_precision_loss, clippy::float_cmp)]
#[must_use]
pub fn roc_auc(probabilities: &[f64], labels: &[f64]) -> f64 {
    let mut scored: Vec<(f64, bool)> = probabilities
        .iter()
        .zip(labels)
        .map(|(&p, &y)| (p, y >= 0.5))
        .collect();
    let positives = scored.iter().filter(|(_, y)| *y).count();
    let negatives = scored.len() - positives;
    if positives == 0 || negatives == 0 {
        return 0.5;
    }
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    let (mut tp, mut fp) = (0_usize, 0_usize);
    let (mut prev_tpr, mut prev_fpr) = (0.0, 0.0);
    let mut auc = 0.0;
    let mut i = 0;
    while i < scored.len() {
        let threshold = scored[i].0;
        while i < scored.len() && scored[i].0 == threshold {
            if scored[i].1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        let tpr = tp as f64 / positives as f64;
        let fpr = fp as f64 / negatives as f64;
        auc += (fpr - prev_fpr) * (tpr + prev_tpr) / 2.0;
        (prev_tpr, prev_fpr) = (tpr, fpr);
    }
    auc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitored_metric_names() {
        assert_eq!(
            "val_auc".parse::<MonitoredMetric>().unwrap(),
            MonitoredMetric::ValAuc
        );
        assert!("loss".parse::<MonitoredMetric>().is_err());
        assert_eq!(MonitoredMetric::default().as_str(), "val_accuracy");
    }

    #[test]
    fn accuracy_thresholds_at_half() {
        let acc = accuracy(&[0.9, 0.4, 0.6, 0.1], &[1.0, 1.0, 0.0, 0.0]);
        assert!((acc - 0.5).abs() < 1e-12);
    }

    #[test]
    fn perfect_ranking_has_unit_auc() {
        let auc = roc_auc(&[0.9, 0.8, 0.3, 0.1], &[1.0, 1.0, 0.0, 0.0]);
        assert!((auc - 1.0).abs() < 1e-12);
        let auc = roc_auc(&[0.1, 0.2, 0.8, 0.9], &[1.0, 1.0, 0.0, 0.0]);
        assert!(auc.abs() < 1e-12);
    }

    #[test]
    fn ties_count_half() {
        let auc = roc_auc(&[0.5, 0.5], &[1.0, 0.0]);
        assert!((auc - 0.5).abs() < 1e-12);
    }

    #[test]
    fn bce_is_finite_at_the_edges() {
        let loss = binary_cross_entropy(&[0.0, 1.0], &[1.0, 0.0]);
        assert!(loss.is_finite());
        assert!(loss > 10.0);
    }
}
