use super::Pruner;
use crate::trial::TrialRecord;

/// A pruner that never prunes.
pub struct NopPruner;

impl Pruner for NopPruner {
    fn should_prune(
        &self,
        _trial_id: u64,
        _step: u64,
        _intermediate_values: &[(u64, f64)],
        _history: &[TrialRecord],
    ) -> bool {
        false
    }
}
