//! Study implementation for managing optimization trials.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::pruner::Pruner;
use crate::sampler::Sampler;
use crate::storage::{Storage, StudyInfo};
use crate::trial::{StudyLink, Trial, TrialRecord};
use crate::types::{Direction, TrialState};

mod analysis;
mod builder;
mod optimize;

pub use builder::StudyBuilder;
pub use optimize::OptimizeSummary;

/// A study drives the search: it hands out trials, records their outcomes in
/// the ledger and answers questions about the best configuration so far.
///
/// A study has exactly one direction and one metric identity, both fixed when
/// it is first created in the ledger.
///
/// # Examples
///
/// ```
/// use skin_search::{Direction, Study};
///
/// let study = Study::builder()
///     .name("Skin_Problem")
///     .direction(Direction::Maximize)
///     .metric("val_accuracy")
///     .build()
///     .unwrap();
/// assert_eq!(study.direction(), Direction::Maximize);
/// ```
pub struct Study {
    pub(crate) info: StudyInfo,
    pub(crate) sampler: Arc<dyn Sampler>,
    pub(crate) pruner: Arc<dyn Pruner>,
    pub(crate) storage: Arc<dyn Storage>,
}

impl Study {
    /// Return a [`StudyBuilder`] for constructing a study with a fluent API.
    #[must_use]
    pub fn builder() -> StudyBuilder {
        StudyBuilder::new()
    }

    /// Study name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Optimization direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.info.direction
    }

    /// Metric identity.
    #[must_use]
    pub fn metric(&self) -> &str {
        &self.info.metric
    }

    /// The ledger this study writes to.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Registers a new RUNNING trial and returns a handle bound to this study.
    ///
    /// The handle samples with the study's sampler over a ledger snapshot taken
    /// now, and consults the study's pruner on every report.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] if the ledger cannot assign a number.
    pub fn create_trial(&self) -> Result<Trial> {
        let number = self.storage.create_trial(self.info.id)?;
        let history = Arc::new(self.storage.trials(self.info.id)?);
        trace_debug!(study = %self.info.name, trial = number, "trial created");
        Ok(Trial::linked(
            number,
            StudyLink {
                study_id: self.info.id,
                direction: self.info.direction,
                sampler: Arc::clone(&self.sampler),
                pruner: Arc::clone(&self.pruner),
                storage: Arc::clone(&self.storage),
                history,
            },
        ))
    }

    /// Finalizes `trial` as COMPLETE with objective `value`.
    ///
    /// # Errors
    ///
    /// A non-finite value records the trial as FAILED and returns
    /// [`Error::Divergence`]. Ledger errors are returned as is.
    pub fn complete_trial(&self, trial: Trial, value: f64) -> Result<()> {
        if !value.is_finite() {
            let epoch = trial.intermediate_values().last().map_or(0, |(s, _)| s);
            self.fail_trial(trial, "objective value is not finite")?;
            return Err(Error::Divergence {
                epoch,
                what: "objective value".to_string(),
                value,
            });
        }
        let (number, _, _) = trial.into_parts();
        self.storage
            .finish_trial(self.info.id, number, TrialState::Complete, Some(value))?;
        trace_info!(trial = number, value, "trial completed");
        Ok(())
    }

    /// Checks the metric identity, then completes the trial.
    ///
    /// # Errors
    ///
    /// [`Error::MetricMismatch`] if `metric` is not this study's metric; the
    /// trial is left untouched in that case. Otherwise as
    /// [`complete_trial`](Self::complete_trial).
    pub fn tell(&self, trial: Trial, metric: &str, value: f64) -> Result<()> {
        if metric != self.info.metric {
            return Err(Error::MetricMismatch {
                expected: self.info.metric.clone(),
                got: metric.to_string(),
            });
        }
        self.complete_trial(trial, value)
    }

    /// Finalizes `trial` as PRUNED. Its intermediate values stay in the ledger.
    ///
    /// # Errors
    ///
    /// Ledger errors.
    pub fn prune_trial(&self, trial: Trial) -> Result<()> {
        let (number, _, _) = trial.into_parts();
        self.storage
            .finish_trial(self.info.id, number, TrialState::Pruned, None)?;
        trace_info!(trial = number, "trial pruned");
        Ok(())
    }

    /// Finalizes `trial` as FAILED.
    ///
    /// # Errors
    ///
    /// Ledger errors.
    pub fn fail_trial(&self, trial: Trial, reason: &str) -> Result<()> {
        let (number, _, _) = trial.into_parts();
        self.storage
            .finish_trial(self.info.id, number, TrialState::Failed, None)?;
        trace_warn!(trial = number, reason, "trial failed");
        #[cfg(not(feature = "tracing"))]
        let _ = reason;
        Ok(())
    }

    /// Owned snapshot of every trial, ordered by number.
    ///
    /// # Errors
    ///
    /// Ledger errors.
    pub fn trials(&self) -> Result<Vec<TrialRecord>> {
        self.storage.trials(self.info.id)
    }

    /// Snapshot of the trials whose state is in `states`.
    ///
    /// # Errors
    ///
    /// Ledger errors.
    pub fn get_trials(&self, states: &[TrialState]) -> Result<Vec<TrialRecord>> {
        let mut trials = self.trials()?;
        trials.retain(|t| states.contains(&t.state));
        Ok(trials)
    }

    /// Number of trials in the ledger, in any state.
    ///
    /// # Errors
    ///
    /// Ledger errors.
    pub fn n_trials(&self) -> Result<usize> {
        Ok(self.trials()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::{IntParam, Parameter};

    fn study(direction: Direction) -> Study {
        Study::builder()
            .name("t")
            .direction(direction)
            .metric("val_accuracy")
            .build()
            .unwrap()
    }

    #[test]
    fn create_trial_assigns_sequential_numbers() {
        let s = study(Direction::Maximize);
        let a = s.create_trial().unwrap();
        let b = s.create_trial().unwrap();
        assert_eq!((a.number(), b.number()), (0, 1));
        assert_eq!(s.get_trials(&[TrialState::Running]).unwrap().len(), 2);
    }

    #[test]
    fn suggestions_are_persisted_immediately() {
        let s = study(Direction::Maximize);
        let mut t = s.create_trial().unwrap();
        let v = IntParam::new("batch_size", 1, 15).suggest(&mut t).unwrap();
        let stored = s.trials().unwrap();
        assert_eq!(stored[0].params.int("batch_size").unwrap(), v);
    }

    #[test]
    fn tell_rejects_other_metric() {
        let s = study(Direction::Maximize);
        let t = s.create_trial().unwrap();
        assert!(matches!(
            s.tell(t, "val_auc", 0.9),
            Err(Error::MetricMismatch { .. })
        ));
        assert!(s.get_trials(&[TrialState::Complete]).unwrap().is_empty());
    }

    #[test]
    fn non_finite_value_fails_the_trial() {
        let s = study(Direction::Maximize);
        let t = s.create_trial().unwrap();
        assert!(matches!(
            s.complete_trial(t, f64::NAN),
            Err(Error::Divergence { .. })
        ));
        assert_eq!(s.get_trials(&[TrialState::Failed]).unwrap().len(), 1);
    }
}
