//! Live trial handles and their persisted snapshots.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::curve::MetricCurve;
use crate::distribution::Distribution;
use crate::error::Result;
use crate::hyperparams::HyperparameterConfiguration;
use crate::param::ParamValue;
use crate::parameter::{BoolParam, CategoricalParam, FloatParam, IntParam, Parameter};
use crate::pruner::Pruner;
use crate::sampler::Sampler;
use crate::sampler::random::RandomSampler;
use crate::storage::Storage;
use crate::types::{Direction, TrialState};

/// A point-in-time snapshot of one trial as stored in the ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Per-study trial number, assigned in creation order starting at 0.
    pub number: u64,
    /// Lifecycle state.
    pub state: TrialState,
    /// Objective value; present iff the trial is complete.
    pub value: Option<f64>,
    /// Sampled hyperparameters.
    pub params: HyperparameterConfiguration,
    /// Intermediate values reported while training.
    pub intermediate_values: MetricCurve,
}

impl TrialRecord {
    /// Returns the raw value of parameter `name`, if it was sampled.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    /// The deepest step this trial reported, if any.
    #[must_use]
    pub fn last_step(&self) -> Option<u64> {
        self.intermediate_values.last().map(|(s, _)| s)
    }
}

/// Everything a trial created by a study needs to reach back into it.
#[derive(Clone)]
pub(crate) struct StudyLink {
    pub(crate) study_id: i64,
    pub(crate) direction: Direction,
    pub(crate) sampler: Arc<dyn Sampler>,
    pub(crate) pruner: Arc<dyn Pruner>,
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) history: Arc<Vec<TrialRecord>>,
}

/// A running trial: one configuration being sampled and trained.
///
/// Trials created through [`Study::create_trial`](crate::Study::create_trial)
/// sample with the study's sampler, persist every suggestion and report to the
/// ledger, and consult the study's pruner on each report. A trial built with
/// [`Trial::new`] samples uniformly at random and never prunes, which is handy
/// for tests and dry runs.
///
/// The handle is consumed by `Study::complete_trial`, `prune_trial` or
/// `fail_trial`, so a finalized trial cannot be mutated.
pub struct Trial {
    number: u64,
    config: HyperparameterConfiguration,
    curve: MetricCurve,
    pruned: bool,
    link: Option<StudyLink>,
}

impl core::fmt::Debug for Trial {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Trial")
            .field("number", &self.number)
            .field("config", &self.config)
            .field("curve", &self.curve)
            .field("pruned", &self.pruned)
            .field("linked", &self.link.is_some())
            .finish()
    }
}

impl Trial {
    /// Creates a detached trial with the given number.
    ///
    /// # Examples
    ///
    /// ```
    /// use skin_search::Trial;
    ///
    /// let trial = Trial::new(3);
    /// assert_eq!(trial.number(), 3);
    /// ```
    #[must_use]
    pub fn new(number: u64) -> Self {
        Self {
            number,
            config: HyperparameterConfiguration::new(),
            curve: MetricCurve::new(),
            pruned: false,
            link: None,
        }
    }

    pub(crate) fn linked(number: u64, link: StudyLink) -> Self {
        Self {
            link: Some(link),
            ..Self::new(number)
        }
    }

    /// Per-study trial number.
    #[must_use]
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Hyperparameters sampled so far.
    #[must_use]
    pub fn config(&self) -> &HyperparameterConfiguration {
        &self.config
    }

    /// Intermediate values reported so far.
    #[must_use]
    pub fn intermediate_values(&self) -> &MetricCurve {
        &self.curve
    }

    /// Returns `true` once the pruner has asked this trial to stop.
    #[must_use]
    pub fn should_prune(&self) -> bool {
        self.pruned
    }

    pub(crate) fn into_parts(self) -> (u64, HyperparameterConfiguration, MetricCurve) {
        (self.number, self.config, self.curve)
    }

    fn sample_value(&self, name: &str, distribution: &Distribution) -> ParamValue {
        match &self.link {
            Some(link) => link.sampler.sample(
                name,
                distribution,
                self.number,
                &link.history,
                link.direction,
            ),
            None => RandomSampler::new().sample(
                name,
                distribution,
                self.number,
                &[],
                Direction::Maximize,
            ),
        }
    }

    /// Suggests a value for `param`.
    ///
    /// Suggesting a name that was already sampled returns the cached value when
    /// the distribution is identical.
    ///
    /// # Errors
    ///
    /// - parameter validation errors ([`InvalidBounds`](crate::Error::InvalidBounds), ...)
    /// - [`ParameterConflict`](crate::Error::ParameterConflict) if `name` was
    ///   sampled before from a different distribution
    /// - [`Storage`](crate::Error::Storage) if the suggestion cannot be persisted
    pub fn suggest_param<P: Parameter>(&mut self, param: &P) -> Result<P::Value> {
        param.validate()?;

        let name = param.name();
        let distribution = param.distribution();

        if let Some(existing) = self.config.distribution(name) {
            if *existing == distribution
                && let Some(value) = self.config.get(name)
            {
                return param.cast_param_value(value);
            }
            return Err(crate::Error::ParameterConflict {
                name: name.to_string(),
                reason: "parameter was previously sampled from a different distribution"
                    .to_string(),
            });
        }

        let value = self.sample_value(name, &distribution);
        let typed = param.cast_param_value(&value)?;

        if let Some(link) = &self.link {
            link.storage
                .set_trial_param(link.study_id, self.number, name, &value, &distribution)?;
        }
        trace_debug!(trial = self.number, param = name, value = %value, "suggested");
        self.config.insert(name, value, distribution);

        Ok(typed)
    }

    /// Suggests an integer in `[low, high]`.
    ///
    /// # Errors
    ///
    /// See [`Trial::suggest_param`].
    pub fn suggest_int(&mut self, name: &str, low: i64, high: i64) -> Result<i64> {
        self.suggest_param(&IntParam::new(name, low, high))
    }

    /// Suggests a float in `[low, high]`.
    ///
    /// # Errors
    ///
    /// See [`Trial::suggest_param`].
    pub fn suggest_float(&mut self, name: &str, low: f64, high: f64) -> Result<f64> {
        self.suggest_param(&FloatParam::new(name, low, high))
    }

    /// Suggests a boolean.
    ///
    /// # Errors
    ///
    /// See [`Trial::suggest_param`].
    pub fn suggest_bool(&mut self, name: &str) -> Result<bool> {
        self.suggest_param(&BoolParam::new(name))
    }

    /// Suggests one of `choices`.
    ///
    /// # Errors
    ///
    /// See [`Trial::suggest_param`].
    pub fn suggest_categorical<I, T>(&mut self, name: &str, choices: I) -> Result<ParamValue>
    where
        I: IntoIterator<Item = T>,
        T: Into<ParamValue>,
    {
        self.suggest_param(&CategoricalParam::new(name, choices))
    }

    /// Reports an intermediate value and returns whether the trial should stop.
    ///
    /// The value is appended to the curve and persisted before the pruner is
    /// consulted with a fresh ledger snapshot. Once a trial has been told to
    /// prune, every later report also returns `true`.
    ///
    /// # Errors
    ///
    /// [`NonIncreasingStep`](crate::Error::NonIncreasingStep) or
    /// [`Divergence`](crate::Error::Divergence) from the curve, and
    /// [`Storage`](crate::Error::Storage) from the ledger.
    pub fn report(&mut self, step: u64, value: f64) -> Result<bool> {
        self.curve.push(step, value)?;

        let Some(link) = &self.link else {
            return Ok(self.pruned);
        };
        link.storage
            .report_intermediate(link.study_id, self.number, step, value)?;
        trace_debug!(trial = self.number, step, value, "intermediate value");

        if !self.pruned {
            let history = link.storage.trials(link.study_id)?;
            if link
                .pruner
                .should_prune(self.number, step, self.curve.as_slice(), &history)
            {
                trace_info!(trial = self.number, step, value, "pruner stopped trial");
                self.pruned = true;
            }
        }
        Ok(self.pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn cached_value_for_identical_distribution() {
        let mut trial = Trial::new(0);
        let a = trial.suggest_int("batch_size", 1, 15).unwrap();
        let b = trial.suggest_int("batch_size", 1, 15).unwrap();
        assert_eq!(a, b);
        assert_eq!(trial.config().len(), 1);
    }

    #[test]
    fn conflict_for_different_distribution() {
        let mut trial = Trial::new(0);
        trial.suggest_int("batch_size", 1, 15).unwrap();
        let err = trial.suggest_int("batch_size", 1, 16).unwrap_err();
        assert!(matches!(err, Error::ParameterConflict { .. }));
        let err = trial.suggest_float("batch_size", 1.0, 15.0).unwrap_err();
        assert!(matches!(err, Error::ParameterConflict { .. }));
    }

    #[test]
    fn detached_trial_never_prunes() {
        let mut trial = Trial::new(0);
        for step in 1..=5 {
            assert!(!trial.report(step, 0.1).unwrap());
        }
        assert_eq!(trial.intermediate_values().len(), 5);
    }

    #[test]
    fn report_rejects_non_increasing_steps() {
        let mut trial = Trial::new(0);
        trial.report(2, 0.5).unwrap();
        assert!(matches!(
            trial.report(2, 0.6),
            Err(Error::NonIncreasingStep { .. })
        ));
    }

    #[test]
    fn categorical_returns_declared_choice() {
        let mut trial = Trial::new(0);
        let v = trial
            .suggest_categorical("l1_weight", [0.0, 1e-4, 1e-2])
            .unwrap();
        assert!([0.0, 1e-4, 1e-2].map(ParamValue::Float).contains(&v));
    }
}
