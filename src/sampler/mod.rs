//! Sampler trait and implementations for parameter sampling.

pub(crate) mod common;
pub mod random;
pub mod tpe;

pub use random::RandomSampler;
pub use tpe::{TpeSampler, TpeSamplerBuilder};

use crate::distribution::Distribution;
use crate::param::ParamValue;
use crate::trial::TrialRecord;
use crate::types::Direction;

/// Trait for pluggable parameter sampling strategies.
///
/// A sampler draws one value at a time. It sees the parameter name so it can
/// model each hyperparameter from the trials that actually sampled it, and the
/// study direction so it knows which trials are good.
///
/// Implementations must return a value inside `distribution`: for numeric
/// distributions within `[low, high]`, for categoricals one of the declared
/// choices.
pub trait Sampler: Send + Sync {
    /// Samples a value for parameter `name`.
    ///
    /// # Arguments
    ///
    /// * `name` - The parameter being sampled.
    /// * `distribution` - The domain for this trial (may depend on earlier values).
    /// * `trial_id` - Number of the trial being sampled for.
    /// * `history` - Ledger snapshot taken when the trial was created.
    /// * `direction` - Whether larger objective values are better.
    fn sample(
        &self,
        name: &str,
        distribution: &Distribution,
        trial_id: u64,
        history: &[TrialRecord],
        direction: Direction,
    ) -> ParamValue;
}
