//! Tree-structured Parzen Estimator (TPE) sampler.
//!
//! TPE splits the observations of a parameter into a "good" group (the best
//! `gamma` fraction of trials) and a "bad" group, fits a density to each, and
//! proposes the candidate that maximizes l(x)/g(x).
//!
//! Pruned trials take part in the split: they rank below every complete trial,
//! deeper ones first, so a trial that survived many rungs still counts as more
//! promising than one that was stopped after the first epoch.

use core::cmp::Ordering;

use parking_lot::Mutex;

use crate::distribution::{CategoricalDistribution, Distribution};
use crate::kde::KernelDensityEstimator;
use crate::param::ParamValue;
use crate::sampler::{Sampler, common};
use crate::trial::TrialRecord;
use crate::types::{Direction, TrialState};

/// A TPE sampler.
///
/// Below `n_startup_trials` usable observations of a parameter the sampler
/// draws uniformly at random.
///
/// # Examples
///
/// ```
/// use skin_search::sampler::TpeSampler;
///
/// let sampler = TpeSampler::builder()
///     .gamma(0.25)
///     .n_startup_trials(10)
///     .n_ei_candidates(24)
///     .seed(42)
///     .build();
/// # let _ = sampler;
/// ```
pub struct TpeSampler {
    gamma: f64,
    n_startup_trials: usize,
    n_ei_candidates: usize,
    rng: Mutex<fastrand::Rng>,
}

impl TpeSampler {
    /// Creates a TPE sampler with gamma 0.25, 10 startup trials and 24 candidates.
    #[must_use]
    pub fn new() -> Self {
        TpeSamplerBuilder::new().build()
    }

    /// Creates a builder for configuring a TPE sampler.
    #[must_use]
    pub fn builder() -> TpeSamplerBuilder {
        TpeSamplerBuilder::new()
    }

    /// Ranks usable observations of one parameter, best first.
    fn ranked<'a>(
        history: &'a [TrialRecord],
        name: &str,
        distribution: &Distribution,
        direction: Direction,
    ) -> Vec<(&'a TrialRecord, &'a ParamValue)> {
        let mut usable: Vec<_> = history
            .iter()
            .filter(|t| match t.state {
                TrialState::Complete => t.value.is_some(),
                TrialState::Pruned => true,
                TrialState::Running | TrialState::Failed => false,
            })
            .filter_map(|t| t.param(name).map(|v| (t, v)))
            .filter(|(_, v)| distribution.contains(v))
            .collect();
        usable.sort_by(|(a, _), (b, _)| compare_trials(a, b, direction));
        usable
    }

    fn split_point(&self, n: usize) -> usize {
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let n_good = (n as f64 * self.gamma).ceil() as usize;
        n_good.clamp(1, n - 1)
    }

    #[allow(clippy::cast_precision_loss)]
    fn sample_numeric(
        &self,
        distribution: &Distribution,
        good: &[&ParamValue],
        bad: &[&ParamValue],
        rng: &mut fastrand::Rng,
    ) -> ParamValue {
        let Some((low, high)) = common::internal_bounds(distribution) else {
            return common::sample_random(rng, distribution);
        };
        let to_internal = |vs: &[&ParamValue]| -> Vec<f64> {
            vs.iter()
                .filter_map(|v| common::to_internal(v, distribution))
                .collect()
        };

        if high - low <= 0.0 {
            return common::from_internal(low, distribution)
                .unwrap_or_else(|| common::sample_random(rng, distribution));
        }

        let n = (good.len() + bad.len()) as f64;
        // Kernels never get narrower than a fraction of the domain.
        let min_bandwidth = (high - low) / (1.0 + n).min(100.0);
        let (Some(l), Some(g)) = (
            KernelDensityEstimator::fit(to_internal(good), min_bandwidth),
            KernelDensityEstimator::fit(to_internal(bad), min_bandwidth),
        ) else {
            return common::sample_random(rng, distribution);
        };
        let mut best: Option<(f64, f64)> = None;
        for _ in 0..self.n_ei_candidates.max(1) {
            let candidate = l.sample(rng).clamp(low, high);
            let score = l.pdf(candidate).ln() - g.pdf(candidate).ln();
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }
        let best = best.map_or(low, |(c, _)| c);

        common::from_internal(best, distribution)
            .unwrap_or_else(|| common::sample_random(rng, distribution))
    }

    #[allow(clippy::cast_precision_loss)]
    fn sample_categorical(
        d: &CategoricalDistribution,
        good: &[&ParamValue],
        bad: &[&ParamValue],
        rng: &mut fastrand::Rng,
    ) -> ParamValue {
        let k = d.choices.len();
        let counts = |vs: &[&ParamValue]| {
            let mut c = vec![0usize; k];
            for v in vs {
                if let Some(i) = d.index_of(v) {
                    c[i] += 1;
                }
            }
            c
        };
        let good_counts = counts(good);
        let bad_counts = counts(bad);
        let good_total = good.len() as f64 + k as f64;
        let bad_total = bad.len() as f64 + k as f64;

        let weights: Vec<f64> = (0..k)
            .map(|i| {
                let l = (good_counts[i] as f64 + 1.0) / good_total;
                let g = (bad_counts[i] as f64 + 1.0) / bad_total;
                l / g
            })
            .collect();

        let threshold = rng.f64() * weights.iter().sum::<f64>();
        let mut cumulative = 0.0;
        for (i, w) in weights.iter().enumerate() {
            cumulative += w;
            if cumulative >= threshold {
                return d.choices[i].clone();
            }
        }
        d.choices[k - 1].clone()
    }
}

impl Default for TpeSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Complete trials by objective, then pruned trials by depth and last value.
fn compare_trials(a: &TrialRecord, b: &TrialRecord, direction: Direction) -> Ordering {
    let better = |x: f64, y: f64| match direction {
        Direction::Minimize => x.partial_cmp(&y),
        Direction::Maximize => y.partial_cmp(&x),
    };
    match (a.state, b.state) {
        (TrialState::Complete, TrialState::Complete) => match (a.value, b.value) {
            (Some(x), Some(y)) => better(x, y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        (TrialState::Complete, _) => Ordering::Less,
        (_, TrialState::Complete) => Ordering::Greater,
        _ => {
            let depth = b.last_step().cmp(&a.last_step());
            depth.then_with(|| {
                match (a.intermediate_values.last(), b.intermediate_values.last()) {
                    (Some((_, x)), Some((_, y))) => better(x, y).unwrap_or(Ordering::Equal),
                    _ => Ordering::Equal,
                }
            })
        }
    }
    .then_with(|| a.number.cmp(&b.number))
}

impl Sampler for TpeSampler {
    fn sample(
        &self,
        name: &str,
        distribution: &Distribution,
        _trial_id: u64,
        history: &[TrialRecord],
        direction: Direction,
    ) -> ParamValue {
        let mut rng = self.rng.lock();

        let ranked = Self::ranked(history, name, distribution, direction);
        if ranked.len() < self.n_startup_trials.max(2) {
            return common::sample_random(&mut rng, distribution);
        }

        let n_good = self.split_point(ranked.len());
        let values: Vec<&ParamValue> = ranked.iter().map(|(_, v)| *v).collect();
        let (good, bad) = values.split_at(n_good);

        match distribution {
            Distribution::Categorical(d) => Self::sample_categorical(d, good, bad, &mut rng),
            Distribution::Float(_) | Distribution::Int(_) => {
                self.sample_numeric(distribution, good, bad, &mut rng)
            }
        }
    }
}

/// Builder for configuring a [`TpeSampler`].
#[derive(Debug, Clone)]
pub struct TpeSamplerBuilder {
    gamma: f64,
    n_startup_trials: usize,
    n_ei_candidates: usize,
    seed: Option<u64>,
}

impl TpeSamplerBuilder {
    /// Creates a builder with gamma 0.25, 10 startup trials and 24 candidates.
    #[must_use]
    pub fn new() -> Self {
        Self {
            gamma: 0.25,
            n_startup_trials: 10,
            n_ei_candidates: 24,
            seed: None,
        }
    }

    /// Sets the fraction of ranked observations treated as good.
    ///
    /// # Panics
    ///
    /// Panics if gamma is not in (0.0, 1.0).
    #[must_use]
    pub fn gamma(mut self, gamma: f64) -> Self {
        assert!(
            gamma > 0.0 && gamma < 1.0,
            "gamma must be in (0.0, 1.0), got {gamma}"
        );
        self.gamma = gamma;
        self
    }

    /// Sets the number of observations required before TPE replaces random sampling.
    #[must_use]
    pub fn n_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    /// Sets the number of candidates drawn from l(x) per suggestion.
    #[must_use]
    pub fn n_ei_candidates(mut self, n: usize) -> Self {
        self.n_ei_candidates = n;
        self
    }

    /// Sets a seed for reproducible sampling.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builds the configured [`TpeSampler`].
    #[must_use]
    pub fn build(self) -> TpeSampler {
        let rng = match self.seed {
            Some(s) => fastrand::Rng::with_seed(s),
            None => fastrand::Rng::new(),
        };
        TpeSampler {
            gamma: self.gamma,
            n_startup_trials: self.n_startup_trials,
            n_ei_candidates: self.n_ei_candidates,
            rng: Mutex::new(rng),
        }
    }
}

impl Default for TpeSamplerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::MetricCurve;
    use crate::distribution::{FloatDistribution, IntDistribution};
    use crate::hyperparams::HyperparameterConfiguration;

    fn float_dist(low: f64, high: f64) -> Distribution {
        Distribution::Float(FloatDistribution { low, high })
    }

    fn record(number: u64, state: TrialState, value: Option<f64>, x: ParamValue) -> TrialRecord {
        let mut params = HyperparameterConfiguration::new();
        params.insert("x", x, float_dist(0.0, 10.0));
        TrialRecord {
            number,
            state,
            value,
            params,
            intermediate_values: MetricCurve::new(),
        }
    }

    fn pruned(number: u64, curve: Vec<(u64, f64)>) -> TrialRecord {
        let mut t = record(number, TrialState::Pruned, None, ParamValue::Float(1.0));
        t.intermediate_values = MetricCurve::from_points(curve);
        t
    }

    #[test]
    #[should_panic(expected = "gamma must be in (0.0, 1.0)")]
    fn rejects_gamma_one() {
        let _ = TpeSampler::builder().gamma(1.0);
    }

    #[test]
    fn ordering_puts_complete_before_pruned() {
        let mut trials = vec![
            pruned(0, vec![(1, 0.9)]),
            record(1, TrialState::Complete, Some(0.6), ParamValue::Float(1.0)),
            pruned(2, vec![(1, 0.5), (2, 0.55), (3, 0.6)]),
            record(3, TrialState::Complete, Some(0.8), ParamValue::Float(1.0)),
            pruned(4, vec![(1, 0.95)]),
        ];
        trials.sort_by(|a, b| compare_trials(a, b, Direction::Maximize));
        let order: Vec<_> = trials.iter().map(|t| t.number).collect();
        assert_eq!(order, [3, 1, 2, 4, 0]);
    }

    #[test]
    fn ordering_respects_minimize() {
        let mut trials = vec![
            record(0, TrialState::Complete, Some(0.6), ParamValue::Float(1.0)),
            record(1, TrialState::Complete, Some(0.2), ParamValue::Float(1.0)),
        ];
        trials.sort_by(|a, b| compare_trials(a, b, Direction::Minimize));
        assert_eq!(trials[0].number, 1);
    }

    #[test]
    fn concentrates_near_good_region() {
        let sampler = TpeSampler::builder().n_startup_trials(5).seed(3).build();
        // Maximize -|x - 2|: the good trials sit near x = 2.
        let history: Vec<_> = (0..30u64)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let x = (i as f64) / 3.0;
                record(i, TrialState::Complete, Some(-(x - 2.0).abs()), ParamValue::Float(x))
            })
            .collect();
        let dist = float_dist(0.0, 10.0);
        let mut near = 0;
        for _ in 0..50 {
            let ParamValue::Float(v) = sampler.sample("x", &dist, 99, &history, Direction::Maximize)
            else {
                panic!("expected a float");
            };
            assert!((0.0..=10.0).contains(&v));
            if (v - 2.0).abs() < 2.5 {
                near += 1;
            }
        }
        assert!(near > 35, "only {near} of 50 samples near the optimum");
    }

    #[test]
    fn ignores_observations_outside_conditional_bounds() {
        let sampler = TpeSampler::builder().n_startup_trials(2).seed(11).build();
        let history: Vec<_> = (0..20u64)
            .map(|i| {
                #[allow(clippy::cast_possible_wrap)]
                let x = 100 + i as i64;
                let mut params = HyperparameterConfiguration::new();
                params.insert(
                    "num_neurons_L2",
                    ParamValue::Int(x),
                    Distribution::Int(IntDistribution { low: 50, high: 300 }),
                );
                #[allow(clippy::cast_precision_loss)]
                let value = Some(i as f64);
                TrialRecord {
                    number: i,
                    state: TrialState::Complete,
                    value,
                    params,
                    intermediate_values: MetricCurve::new(),
                }
            })
            .collect();
        let dist = Distribution::Int(IntDistribution { low: 5, high: 20 });
        for _ in 0..50 {
            let ParamValue::Int(v) =
                sampler.sample("num_neurons_L2", &dist, 20, &history, Direction::Maximize)
            else {
                panic!("expected an int");
            };
            assert!((5..=20).contains(&v));
        }
    }

    #[test]
    fn categorical_prefers_good_choice() {
        let sampler = TpeSampler::builder().n_startup_trials(4).seed(5).build();
        let choices: Vec<ParamValue> = vec!["tanh".into(), "elu".into(), "swish".into()];
        let dist = Distribution::Categorical(CategoricalDistribution {
            choices: choices.clone(),
        });
        let history: Vec<_> = (0..24u64)
            .map(|i| {
                let choice = choices[usize::try_from(i % 3).unwrap()].clone();
                let value = if choice == ParamValue::from("swish") { 0.9 } else { 0.5 };
                let mut params = HyperparameterConfiguration::new();
                params.insert("activation", choice, dist.clone());
                TrialRecord {
                    number: i,
                    state: TrialState::Complete,
                    value: Some(value),
                    params,
                    intermediate_values: MetricCurve::new(),
                }
            })
            .collect();
        let swish = (0..200)
            .filter(|_| {
                sampler.sample("activation", &dist, 30, &history, Direction::Maximize)
                    == ParamValue::from("swish")
            })
            .count();
        assert!(swish > 90, "swish drawn {swish} of 200 times");
    }
}
