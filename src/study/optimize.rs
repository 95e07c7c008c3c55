use crate::error::{Error, Result};
use crate::objective::Objective;

use super::Study;

/// Outcome counts of one [`Study::optimize`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OptimizeSummary {
    /// Trials finalized as COMPLETE.
    pub completed: usize,
    /// Trials finalized as PRUNED.
    pub pruned: usize,
    /// Trials finalized as FAILED.
    pub failed: usize,
}

impl Study {
    /// Run `n_trials` sequential trials of `objective`.
    ///
    /// Each trial ends in exactly one terminal state:
    ///
    /// - the objective returns a value and the pruner never fired: COMPLETE
    /// - the pruner fired, or the objective returned [`Error::TrialPruned`]: PRUNED
    /// - the objective returned a trial-fatal error
    ///   ([`Error::is_trial_fatal`]): FAILED, and the search continues
    ///
    /// Any other error marks the current trial FAILED (best effort) and stops
    /// the search.
    ///
    /// # Errors
    ///
    /// [`Error::MetricMismatch`] if the objective measures a different metric
    /// than the study, checked before any trial is created. Study-fatal errors
    /// raised while running are returned as they occur.
    ///
    /// # Examples
    ///
    /// ```
    /// use skin_search::{Direction, Study, objective};
    ///
    /// let study = Study::builder()
    ///     .direction(Direction::Minimize)
    ///     .metric("loss")
    ///     .build()
    ///     .unwrap();
    /// let obj = objective::from_fn("loss", |trial| {
    ///     let x = trial.suggest_float("x", -4.0, 4.0)?;
    ///     Ok(x * x)
    /// });
    ///
    /// let summary = study.optimize(10, &obj).unwrap();
    /// assert_eq!(summary.completed, 10);
    /// assert!(study.best_value().unwrap() >= 0.0);
    /// ```
    pub fn optimize<O>(&self, n_trials: usize, objective: &O) -> Result<OptimizeSummary>
    where
        O: Objective + ?Sized,
    {
        if objective.metric() != self.metric() {
            return Err(Error::MetricMismatch {
                expected: self.metric().to_string(),
                got: objective.metric().to_string(),
            });
        }

        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!(
            "optimize",
            study = %self.name(),
            n_trials,
            direction = self.direction().as_str()
        )
        .entered();

        let mut summary = OptimizeSummary::default();
        let mut best = self.best_value().ok();

        for _ in 0..n_trials {
            let mut trial = self.create_trial()?;
            #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
            let number = trial.number();

            match objective.evaluate(&mut trial) {
                Ok(_) if trial.should_prune() => {
                    self.prune_trial(trial)?;
                    summary.pruned += 1;
                }
                Ok(value) => match self.complete_trial(trial, value) {
                    Ok(()) => {
                        summary.completed += 1;
                        if best.is_none_or(|b| self.direction().is_better(value, b)) {
                            best = Some(value);
                            trace_info!(trial = number, value, "new best trial");
                        }
                    }
                    Err(e) if e.is_trial_fatal() => summary.failed += 1,
                    Err(e) => return Err(e),
                },
                Err(Error::TrialPruned) => {
                    self.prune_trial(trial)?;
                    summary.pruned += 1;
                }
                Err(e) if e.is_trial_fatal() => {
                    self.fail_trial(trial, &e.to_string())?;
                    summary.failed += 1;
                }
                Err(e) => {
                    if let Err(secondary) = self.fail_trial(trial, &e.to_string()) {
                        trace_warn!(trial = number, error = %secondary, "could not record failure");
                        #[cfg(not(feature = "tracing"))]
                        let _ = secondary;
                    }
                    return Err(e);
                }
            }
        }

        trace_info!(
            completed = summary.completed,
            pruned = summary.pruned,
            failed = summary.failed,
            "optimization finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::objective::from_fn;
    use crate::pruner::SuccessiveHalvingPruner;
    use crate::types::{Direction, TrialState};
    use crate::Study;

    #[test]
    fn metric_is_checked_before_any_trial() {
        let study = Study::builder().metric("val_accuracy").build().unwrap();
        let obj = from_fn("val_auc", |_| Ok(0.5));
        assert!(matches!(
            study.optimize(3, &obj),
            Err(Error::MetricMismatch { .. })
        ));
        assert_eq!(study.n_trials().unwrap(), 0);
    }

    #[test]
    fn trial_fatal_errors_do_not_stop_the_search() {
        let study = Study::builder().build().unwrap();
        let obj = from_fn("val_accuracy", |trial| {
            if trial.number() % 2 == 0 {
                Err(Error::Configuration("bad width".into()))
            } else {
                Ok(0.5)
            }
        });
        let summary = study.optimize(4, &obj).unwrap();
        assert_eq!((summary.completed, summary.failed), (2, 2));
        assert_eq!(study.get_trials(&[TrialState::Failed]).unwrap().len(), 2);
    }

    #[test]
    fn study_fatal_error_aborts_and_fails_the_trial() {
        let study = Study::builder().build().unwrap();
        let obj = from_fn("val_accuracy", |_| Err(Error::Storage("disk".into())));
        assert!(study.optimize(5, &obj).is_err());
        let trials = study.trials().unwrap();
        assert_eq!(trials.len(), 1);
        assert_eq!(trials[0].state, TrialState::Failed);
    }

    #[test]
    fn pruned_trials_keep_their_curves() {
        let study = Study::builder()
            .direction(Direction::Maximize)
            .pruner(
                SuccessiveHalvingPruner::new()
                    .min_resource(1)
                    .reduction_factor(2)
                    .direction(Direction::Maximize),
            )
            .build()
            .unwrap();
        let obj = from_fn("val_accuracy", |trial| {
            let quality = if trial.number() < 3 { 0.9 } else { 0.1 };
            let mut last = 0.0;
            for epoch in 1..=4_u64 {
                #[allow(clippy::cast_precision_loss)]
                let acc = quality * epoch as f64 / 4.0;
                last = acc;
                if trial.report(epoch, acc)? {
                    return Err(Error::TrialPruned);
                }
            }
            Ok(last)
        });
        let summary = study.optimize(6, &obj).unwrap();
        assert_eq!(summary.completed + summary.pruned, 6);
        assert!(summary.pruned >= 1);
        for t in study.get_trials(&[TrialState::Pruned]).unwrap() {
            assert!(!t.intermediate_values.is_empty());
            assert!(t.intermediate_values.len() < 4);
        }
    }
}
