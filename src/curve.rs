//! Intermediate metric curve of a trial.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// `(step, value)` pairs reported during training.
///
/// Steps are strictly increasing and values are finite.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricCurve {
    points: Vec<(u64, f64)>,
}

impl MetricCurve {
    /// Creates an empty curve.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a point.
    ///
    /// # Errors
    ///
    /// [`Error::NonIncreasingStep`] if `step` does not exceed the last step,
    /// [`Error::Divergence`] if `value` is NaN or infinite.
    pub fn push(&mut self, step: u64, value: f64) -> Result<()> {
        if let Some(&(last, _)) = self.points.last()
            && step <= last
        {
            return Err(Error::NonIncreasingStep { step, last });
        }
        if !value.is_finite() {
            return Err(Error::Divergence {
                epoch: step,
                what: "intermediate value".to_string(),
                value,
            });
        }
        self.points.push((step, value));
        Ok(())
    }

    /// Builds a curve from stored points, keeping their order.
    pub(crate) fn from_points(points: Vec<(u64, f64)>) -> Self {
        Self { points }
    }

    /// The points as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[(u64, f64)] {
        &self.points
    }

    /// The most recent point.
    #[must_use]
    pub fn last(&self) -> Option<(u64, f64)> {
        self.points.last().copied()
    }

    /// Value at exactly `step`.
    #[must_use]
    pub fn value_at(&self, step: u64) -> Option<f64> {
        self.points
            .binary_search_by_key(&step, |&(s, _)| s)
            .ok()
            .map(|i| self.points[i].1)
    }

    /// Number of reported points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if nothing was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_repeated_or_decreasing_steps() {
        let mut c = MetricCurve::new();
        c.push(1, 0.5).unwrap();
        c.push(2, 0.6).unwrap();
        assert!(matches!(
            c.push(2, 0.7),
            Err(Error::NonIncreasingStep { step: 2, last: 2 })
        ));
        assert!(c.push(1, 0.7).is_err());
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn rejects_non_finite_values() {
        let mut c = MetricCurve::new();
        assert!(matches!(c.push(1, f64::NAN), Err(Error::Divergence { .. })));
        assert!(c.push(1, f64::INFINITY).is_err());
        assert!(c.is_empty());
    }

    #[test]
    fn lookups() {
        let c = MetricCurve::from_points(vec![(1, 0.5), (3, 0.7), (4, 0.6)]);
        assert_eq!(c.value_at(3), Some(0.7));
        assert_eq!(c.value_at(2), None);
        assert_eq!(c.last(), Some((4, 0.6)));
    }
}
