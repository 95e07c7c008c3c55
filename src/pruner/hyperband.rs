//! `HyperBand` pruner: several Successive Halving brackets side by side.
//!
//! - **Bracket 0**: smallest starting budget, most rungs (aggressive pruning)
//! - **Bracket `s_max`**: full budget only (no pruning)
//!
//! A trial's bracket is its number modulo the bracket count, so assignment is
//! reproducible across process restarts without extra ledger state. Trials
//! are only compared with trials of the same bracket.
//!
//! # Configuration
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `min_resource` | 1 | Smallest budget for the most aggressive bracket |
//! | `max_resource` | 81 | Full budget (last rung in every bracket) |
//! | `reduction_factor` | 3 | At each rung, keep top 1/η trials |
//! | `direction` | `Maximize` | Optimization direction |

use std::collections::HashSet;

use parking_lot::Mutex;

use super::{Pruner, active_rung, is_outside_top, peer_values, value_at_rung};
use crate::trial::TrialRecord;
use crate::types::Direction;

/// `HyperBand` pruner.
///
/// # Examples
///
/// ```
/// use skin_search::Direction;
/// use skin_search::pruner::HyperbandPruner;
///
/// let pruner = HyperbandPruner::new()
///     .min_resource(1)
///     .max_resource(10)
///     .reduction_factor(3)
///     .direction(Direction::Maximize);
/// assert_eq!(pruner.n_brackets(), 3);
/// ```
pub struct HyperbandPruner {
    min_resource: u64,
    max_resource: u64,
    reduction_factor: u64,
    direction: Direction,
    pruned: Mutex<HashSet<u64>>,
}

impl HyperbandPruner {
    /// Defaults: `min_resource=1`, `max_resource=81`, `reduction_factor=3`,
    /// `direction=Maximize`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            min_resource: 1,
            max_resource: 81,
            reduction_factor: 3,
            direction: Direction::Maximize,
            pruned: Mutex::new(HashSet::new()),
        }
    }

    /// Set the minimum resource (budget) per trial.
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

    /// Set the maximum resource (budget) per trial, normally the epoch budget.
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

    /// Set the optimization direction.
    #[must_use]
    pub fn direction(mut self, d: Direction) -> Self {
        self.direction = d;
        self
    }

    /// `s_max = floor(log_eta(max_resource / min_resource))`, computed exactly.
    fn s_max(&self) -> u64 {
        let mut s = 0;
        let mut budget = self.min_resource;
        while let Some(next) = budget.checked_mul(self.reduction_factor) {
            if next > self.max_resource {
                break;
            }
            budget = next;
            s += 1;
        }
        s
    }

    /// Number of brackets, `s_max + 1`.
    #[must_use]
    pub fn n_brackets(&self) -> u64 {
        self.s_max() + 1
    }

    /// Bracket of a trial.
    #[must_use]
    pub fn bracket_of(&self, trial_id: u64) -> u64 {
        trial_id % self.n_brackets()
    }

    /// Rungs of bracket `b`: `ceil(max / eta^(s_max - b)) * eta^k <= max`.
    fn rung_steps_for_bracket(&self, bracket: u64) -> Vec<u64> {
        let exponent = u32::try_from(self.s_max().saturating_sub(bracket)).unwrap_or(u32::MAX);
        let divisor = self
            .reduction_factor
            .checked_pow(exponent)
            .unwrap_or(u64::MAX);
        let start = self.max_resource.div_ceil(divisor).max(1);

        let mut steps = Vec::new();
        let mut rung: u32 = 0;
        while let Some(power) = self.reduction_factor.checked_pow(rung) {
            let step = start.saturating_mul(power);
            if step > self.max_resource {
                break;
            }
            steps.push(step);
            rung += 1;
        }
        steps
    }
}

impl Default for HyperbandPruner {
    fn default() -> Self {
        Self::new()
    }
}

impl Pruner for HyperbandPruner {
    fn should_prune(
        &self,
        trial_id: u64,
        step: u64,
        intermediate_values: &[(u64, f64)],
        history: &[TrialRecord],
    ) -> bool {
        if self.pruned.lock().contains(&trial_id) {
            return true;
        }

        let bracket = self.bracket_of(trial_id);
        let rungs = self.rung_steps_for_bracket(bracket);
        let Some(rung) = active_rung(&rungs, step, self.max_resource) else {
            return false;
        };
        let Some(current) = value_at_rung(intermediate_values, rung) else {
            return false;
        };
        let peers = peer_values(history, trial_id, rung, |t| {
            self.bracket_of(t.number) == bracket
        });

        let prune = is_outside_top(current, peers, self.reduction_factor, self.direction);
        if prune {
            self.pruned.lock().insert(trial_id);
        }
        prune
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pruner::test_util::trial;
    use crate::types::TrialState;

    #[test]
    fn s_max_and_brackets() {
        assert_eq!(HyperbandPruner::new().s_max(), 4);
        let p = HyperbandPruner::new().max_resource(10);
        assert_eq!(p.s_max(), 2);
        assert_eq!(p.n_brackets(), 3);
        let p = HyperbandPruner::new().max_resource(16).reduction_factor(2);
        assert_eq!(p.s_max(), 4);
    }

    #[test]
    fn rung_steps_default() {
        let p = HyperbandPruner::new();
        assert_eq!(p.rung_steps_for_bracket(0), vec![1, 3, 9, 27, 81]);
        assert_eq!(p.rung_steps_for_bracket(2), vec![9, 27, 81]);
        assert_eq!(p.rung_steps_for_bracket(4), vec![81]);
    }

    #[test]
    fn rung_steps_ten_epochs() {
        let p = HyperbandPruner::new().max_resource(10);
        assert_eq!(p.rung_steps_for_bracket(0), vec![2, 6]);
        assert_eq!(p.rung_steps_for_bracket(1), vec![4]);
        assert_eq!(p.rung_steps_for_bracket(2), vec![10]);
    }

    #[test]
    fn bracket_is_number_modulo_count() {
        let p = HyperbandPruner::new();
        assert_eq!(p.bracket_of(0), 0);
        assert_eq!(p.bracket_of(4), 4);
        assert_eq!(p.bracket_of(5), 0);
        assert_eq!(p.bracket_of(103), 3);
    }

    #[test]
    fn compares_only_within_bracket() {
        let p = HyperbandPruner::new().direction(Direction::Minimize);
        // Bracket 0: 0, 5, 10. Bracket 1: 1, 6, 11.
        let history = vec![
            trial(0, TrialState::Complete, &[(1, 100.0)]),
            trial(5, TrialState::Complete, &[(1, 100.0)]),
            trial(10, TrialState::Complete, &[(1, 100.0)]),
            trial(1, TrialState::Complete, &[(1, 1.0)]),
            trial(6, TrialState::Complete, &[(1, 1.0)]),
            trial(11, TrialState::Complete, &[(1, 1.0)]),
        ];
        assert!(!p.should_prune(25, 1, &[(1, 50.0)], &history));
    }

    #[test]
    fn prunes_worst_in_bracket_and_stays_pruned() {
        let p = HyperbandPruner::new().direction(Direction::Maximize);
        let history = vec![
            trial(0, TrialState::Complete, &[(1, 1.0)]),
            trial(5, TrialState::Pruned, &[(1, 2.0)]),
            trial(10, TrialState::Running, &[(1, 3.0)]),
        ];
        assert!(!p.should_prune(15, 1, &[(1, 2.0)], &history));
        assert!(p.should_prune(20, 1, &[(1, 0.5)], &history));
        // Sticky even when a later value would survive.
        assert!(p.should_prune(20, 2, &[(1, 0.5), (2, 9.0)], &history));
    }

    #[test]
    fn skips_when_fewer_than_eta_peers() {
        let p = HyperbandPruner::new().direction(Direction::Maximize);
        let history = vec![
            trial(0, TrialState::Complete, &[(1, 1.0)]),
            trial(5, TrialState::Complete, &[(1, 2.0)]),
            trial(10, TrialState::Failed, &[(1, 3.0)]),
        ];
        assert!(!p.should_prune(15, 1, &[(1, 0.0)], &history));
    }

    #[test]
    fn never_prunes_at_full_budget() {
        let p = HyperbandPruner::new().direction(Direction::Maximize);
        let history: Vec<_> = (0..9)
            .map(|i| trial(i * 5, TrialState::Complete, &[(81, 1.0)]))
            .collect();
        assert!(!p.should_prune(100, 81, &[(81, 0.0)], &history));
    }

    #[test]
    #[should_panic(expected = "reduction_factor must be >= 2")]
    fn rejects_reduction_factor_one() {
        let _ = HyperbandPruner::new().reduction_factor(1);
    }
}
