//! Random sampler implementation.

use parking_lot::Mutex;

use crate::distribution::Distribution;
use crate::param::ParamValue;
use crate::sampler::{Sampler, common};
use crate::trial::TrialRecord;
use crate::types::Direction;

/// Samples uniformly from each distribution, ignoring history.
///
/// Serves as a baseline and as the startup phase of [`TpeSampler`](super::TpeSampler).
///
/// # Examples
///
/// ```
/// use skin_search::sampler::RandomSampler;
///
/// let sampler = RandomSampler::with_seed(42);
/// # let _ = sampler;
/// ```
pub struct RandomSampler {
    rng: Mutex<fastrand::Rng>,
}

impl RandomSampler {
    /// Creates a new random sampler with a random seed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::new()),
        }
    }

    /// Creates a new random sampler with a fixed seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::with_seed(seed)),
        }
    }
}

impl Default for RandomSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for RandomSampler {
    fn sample(
        &self,
        _name: &str,
        distribution: &Distribution,
        _trial_id: u64,
        _history: &[TrialRecord],
        _direction: Direction,
    ) -> ParamValue {
        common::sample_random(&mut self.rng.lock(), distribution)
    }
}

#[cfg(test)]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use crate::distribution::{CategoricalDistribution, FloatDistribution, IntDistribution};

    fn draw(sampler: &RandomSampler, dist: &Distribution) -> ParamValue {
        sampler.sample("x", dist, 0, &[], Direction::Maximize)
    }

    #[test]
    fn int_covers_inclusive_range() {
        let sampler = RandomSampler::with_seed(1);
        let dist = Distribution::Int(IntDistribution { low: 0, high: 3 });
        let mut seen = [false; 4];
        for _ in 0..200 {
            let ParamValue::Int(v) = draw(&sampler, &dist) else {
                panic!("expected an int");
            };
            seen[v as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn categorical_returns_a_choice() {
        let sampler = RandomSampler::with_seed(42);
        let choices: Vec<ParamValue> = vec!["tanh".into(), "elu".into(), "swish".into()];
        let dist = Distribution::Categorical(CategoricalDistribution {
            choices: choices.clone(),
        });
        for _ in 0..50 {
            assert!(choices.contains(&draw(&sampler, &dist)));
        }
    }

    #[test]
    fn seeded_samplers_agree() {
        let a = RandomSampler::with_seed(42);
        let b = RandomSampler::with_seed(42);
        let dist = Distribution::Float(FloatDistribution { low: 0.0, high: 1.0 });
        for _ in 0..10 {
            assert_eq!(draw(&a, &dist), draw(&b, &dist));
        }
    }
}
