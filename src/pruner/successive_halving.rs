//! Successive Halving pruner: budget-aware pruning at exponential rungs.
//!
//! With `min_resource=1`, `max_resource=9`, `reduction_factor=3` the rungs sit
//! at steps 1, 3 and 9. At every rung but the last only the top 1/η of the
//! trials that reached it survive.

use super::{Pruner, active_rung, is_outside_top, peer_values, value_at_rung};
use crate::trial::TrialRecord;
use crate::types::Direction;

/// Successive Halving pruner with a single bracket.
///
/// # Examples
///
/// ```
/// use skin_search::Direction;
/// use skin_search::pruner::SuccessiveHalvingPruner;
///
/// let pruner = SuccessiveHalvingPruner::new()
///     .min_resource(1)
///     .max_resource(9)
///     .reduction_factor(3)
///     .direction(Direction::Maximize);
/// # let _ = pruner;
/// ```
pub struct SuccessiveHalvingPruner {
    min_resource: u64,
    max_resource: u64,
    reduction_factor: u64,
    min_early_stopping_rate: u64,
    direction: Direction,
}

impl SuccessiveHalvingPruner {
    /// Defaults: `min_resource=1`, `max_resource=81`, `reduction_factor=3`,
    /// `min_early_stopping_rate=0`, `direction=Maximize`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            min_resource: 1,
            max_resource: 81,
            reduction_factor: 3,
            min_early_stopping_rate: 0,
            direction: Direction::Maximize,
        }
    }

    /// Set the first rung.
    ///
    /// # Panics
    ///
    /// Panics if `r` is 0.
    #[must_use]
    pub fn min_resource(mut self, r: u64) -> Self {
        assert!(r > 0, "min_resource must be > 0, got {r}");
        self.min_resource = r;
        self
    }

    /// Set the full budget.
    ///
    /// # Panics
    ///
    /// Panics if `r` is 0.
    #[must_use]
    pub fn max_resource(mut self, r: u64) -> Self {
        assert!(r > 0, "max_resource must be > 0, got {r}");
        self.max_resource = r;
        self
    }

    /// Set the reduction factor (eta).
    ///
    /// # Panics
    ///
    /// Panics if `eta` is less than 2.
    #[must_use]
    pub fn reduction_factor(mut self, eta: u64) -> Self {
        assert!(eta >= 2, "reduction_factor must be >= 2, got {eta}");
        self.reduction_factor = eta;
        self
    }

    /// Skip the first `n` rungs.
    #[must_use]
    pub fn min_early_stopping_rate(mut self, n: u64) -> Self {
        self.min_early_stopping_rate = n;
        self
    }

    /// Set the optimization direction.
    #[must_use]
    pub fn direction(mut self, d: Direction) -> Self {
        self.direction = d;
        self
    }

    fn rung_steps(&self) -> Vec<u64> {
        let mut steps = Vec::new();
        let mut rung: u32 = 0;
        while let Some(power) = self.reduction_factor.checked_pow(rung) {
            let step = self.min_resource.saturating_mul(power);
            if step > self.max_resource {
                break;
            }
            if u64::from(rung) >= self.min_early_stopping_rate {
                steps.push(step);
            }
            rung += 1;
        }
        steps
    }
}

impl Default for SuccessiveHalvingPruner {
    fn default() -> Self {
        Self::new()
    }
}

impl Pruner for SuccessiveHalvingPruner {
    fn should_prune(
        &self,
        trial_id: u64,
        step: u64,
        intermediate_values: &[(u64, f64)],
        history: &[TrialRecord],
    ) -> bool {
        let Some(rung) = active_rung(&self.rung_steps(), step, self.max_resource) else {
            return false;
        };
        let Some(current) = value_at_rung(intermediate_values, rung) else {
            return false;
        };
        let peers = peer_values(history, trial_id, rung, |_| true);
        is_outside_top(current, peers, self.reduction_factor, self.direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pruner::test_util::trial;
    use crate::types::TrialState;

    #[test]
    fn rung_steps_are_geometric() {
        let p = SuccessiveHalvingPruner::new().max_resource(81);
        assert_eq!(p.rung_steps(), vec![1, 3, 9, 27, 81]);
        let p = p.min_early_stopping_rate(2);
        assert_eq!(p.rung_steps(), vec![9, 27, 81]);
    }

    #[test]
    fn prunes_worst_at_rung() {
        let p = SuccessiveHalvingPruner::new()
            .max_resource(9)
            .direction(Direction::Maximize);
        let history = vec![
            trial(0, TrialState::Complete, &[(1, 0.9)]),
            trial(1, TrialState::Complete, &[(1, 0.8)]),
            trial(2, TrialState::Pruned, &[(1, 0.7)]),
        ];
        assert!(p.should_prune(3, 1, &[(1, 0.6)], &history));
        assert!(!p.should_prune(3, 1, &[(1, 0.85)], &history));
    }

    #[test]
    fn failed_trials_are_not_peers() {
        let p = SuccessiveHalvingPruner::new()
            .max_resource(9)
            .direction(Direction::Maximize);
        let history = vec![
            trial(0, TrialState::Complete, &[(1, 0.9)]),
            trial(1, TrialState::Failed, &[(1, 0.8)]),
            trial(2, TrialState::Complete, &[(1, 0.7)]),
        ];
        assert!(!p.should_prune(3, 1, &[(1, 0.1)], &history));
    }
}
