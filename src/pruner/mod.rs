//! Pruner trait and implementations for trial pruning.
//!
//! Pruners decide whether to stop a trial early by comparing its intermediate
//! values with those of other trials in the ledger. The search loop consults
//! the pruner once per epoch, right after the validation metric is reported.

mod hyperband;
mod nop;
mod successive_halving;

pub use hyperband::HyperbandPruner;
pub use nop::NopPruner;
pub use successive_halving::SuccessiveHalvingPruner;

use crate::trial::TrialRecord;
use crate::types::{Direction, TrialState};

/// Trait for pluggable trial pruning strategies.
///
/// # Implementing a custom pruner
///
/// ```
/// use skin_search::pruner::Pruner;
/// use skin_search::TrialRecord;
///
/// struct FloorPruner {
///     floor: f64,
/// }
///
/// impl Pruner for FloorPruner {
///     fn should_prune(
///         &self,
///         _trial_id: u64,
///         _step: u64,
///         intermediate_values: &[(u64, f64)],
///         _history: &[TrialRecord],
///     ) -> bool {
///         intermediate_values.last().is_some_and(|&(_, v)| v < self.floor)
///     }
/// }
/// ```
pub trait Pruner: Send + Sync {
    /// Decide whether to prune a trial at the given step.
    ///
    /// # Arguments
    ///
    /// * `trial_id` - The current trial's number.
    /// * `step` - The step (1-based epoch) that was just reported.
    /// * `intermediate_values` - All `(step, value)` pairs reported so far for this trial.
    /// * `history` - Fresh ledger snapshot, which may include the current trial.
    fn should_prune(
        &self,
        trial_id: u64,
        step: u64,
        intermediate_values: &[(u64, f64)],
        history: &[TrialRecord],
    ) -> bool;
}

/// Highest rung at or below `step`, unless that rung is the full budget.
fn active_rung(rungs: &[u64], step: u64, max_resource: u64) -> Option<u64> {
    let rung = rungs.iter().rev().copied().find(|&r| r <= step)?;
    (rung < max_resource).then_some(rung)
}

/// Value of the current trial at `rung`, or the latest one reported before it.
fn value_at_rung(intermediate_values: &[(u64, f64)], rung: u64) -> Option<f64> {
    intermediate_values
        .iter()
        .rev()
        .find(|&&(s, _)| s <= rung)
        .map(|&(_, v)| v)
}

/// Values at exactly `rung` from other non-failed trials accepted by `peer`.
fn peer_values(
    history: &[TrialRecord],
    trial_id: u64,
    rung: u64,
    peer: impl Fn(&TrialRecord) -> bool,
) -> Vec<f64> {
    history
        .iter()
        .filter(|t| t.number != trial_id && t.state != TrialState::Failed)
        .filter(|t| peer(t))
        .filter_map(|t| t.intermediate_values.value_at(rung))
        .collect()
}

/// Keeps the top `ceil((n + 1) / eta)` of the peers plus the current value.
///
/// Returns `false` without comparing when fewer than `eta` peers exist.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn is_outside_top(current: f64, mut peers: Vec<f64>, eta: u64, direction: Direction) -> bool {
    if (peers.len() as u64) < eta {
        return false;
    }
    peers.push(current);
    peers.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(core::cmp::Ordering::Equal));
    if direction == Direction::Maximize {
        peers.reverse();
    }
    let n_keep = (peers.len() as f64 / eta as f64).ceil() as usize;
    let threshold = peers[n_keep.max(1) - 1];
    match direction {
        Direction::Minimize => current > threshold,
        Direction::Maximize => current < threshold,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_rung_skips_full_budget() {
        assert_eq!(active_rung(&[1, 3, 9], 4, 9), Some(3));
        assert_eq!(active_rung(&[1, 3, 9], 9, 9), None);
        assert_eq!(active_rung(&[2, 6], 1, 10), None);
    }

    #[test]
    fn too_few_peers_skip_comparison() {
        assert!(!is_outside_top(0.0, vec![1.0, 1.0], 3, Direction::Maximize));
    }

    #[test]
    fn threshold_keeps_top_fraction() {
        // Peers 1, 2, 3 plus current: keep ceil(4/3) = 2.
        assert!(!is_outside_top(2.0, vec![1.0, 2.0, 3.0], 3, Direction::Maximize));
        assert!(is_outside_top(1.5, vec![1.0, 2.0, 3.0], 3, Direction::Maximize));
        assert!(!is_outside_top(2.0, vec![1.0, 2.0, 3.0], 3, Direction::Minimize));
        assert!(is_outside_top(2.5, vec![1.0, 2.0, 3.0], 3, Direction::Minimize));
    }
}
