use core::cmp::Ordering;

use crate::error::{Error, Result};
use crate::importance::spearman;
use crate::trial::TrialRecord;
use crate::types::{Direction, TrialState};

use super::Study;

/// Orders complete trials best first; ties go to the lower trial number.
fn rank(a: &TrialRecord, b: &TrialRecord, direction: Direction) -> Ordering {
    let (va, vb) = (a.value.unwrap_or(f64::NAN), b.value.unwrap_or(f64::NAN));
    let by_value = match direction {
        Direction::Minimize => va.partial_cmp(&vb),
        Direction::Maximize => vb.partial_cmp(&va),
    };
    by_value
        .unwrap_or(Ordering::Equal)
        .then(a.number.cmp(&b.number))
}

impl Study {
    fn ranked_complete(&self) -> Result<Vec<TrialRecord>> {
        let mut complete = self.get_trials(&[TrialState::Complete])?;
        complete.retain(|t| t.value.is_some_and(f64::is_finite));
        let direction = self.direction();
        complete.sort_by(|a, b| rank(a, b, direction));
        Ok(complete)
    }

    /// Return the COMPLETE trial with the best objective value.
    ///
    /// Pruned, failed and running trials are never candidates. When several
    /// trials share the best value the one created first wins.
    ///
    /// # Errors
    ///
    /// [`Error::NoCompletedTrials`] if nothing has completed yet.
    ///
    /// # Examples
    ///
    /// ```
    /// use skin_search::{Direction, Study};
    ///
    /// let study = Study::builder().direction(Direction::Maximize).build().unwrap();
    /// assert!(study.best_trial().is_err());
    ///
    /// let t0 = study.create_trial().unwrap();
    /// study.complete_trial(t0, 0.80).unwrap();
    /// let t1 = study.create_trial().unwrap();
    /// study.prune_trial(t1).unwrap();
    /// let t2 = study.create_trial().unwrap();
    /// study.complete_trial(t2, 0.85).unwrap();
    ///
    /// assert_eq!(study.best_trial().unwrap().number, 2);
    /// ```
    pub fn best_trial(&self) -> Result<TrialRecord> {
        self.ranked_complete()?
            .into_iter()
            .next()
            .ok_or(Error::NoCompletedTrials)
    }

    /// Objective value of [`best_trial`](Self::best_trial).
    ///
    /// # Errors
    ///
    /// As [`best_trial`](Self::best_trial).
    pub fn best_value(&self) -> Result<f64> {
        self.best_trial()?.value.ok_or(Error::NoCompletedTrials)
    }

    /// Up to `n` complete trials, best first.
    ///
    /// # Errors
    ///
    /// Ledger errors.
    pub fn top_trials(&self, n: usize) -> Result<Vec<TrialRecord>> {
        let mut ranked = self.ranked_complete()?;
        ranked.truncate(n);
        Ok(ranked)
    }

    /// Relative importance of each hyperparameter, highest first.
    ///
    /// Importance is the absolute Spearman rank correlation between a
    /// parameter's value and the objective over the complete trials that
    /// sampled it, normalized to sum to one. String-valued parameters are
    /// ranked by their position in the declared choices.
    ///
    /// Returns an empty list with fewer than two complete trials.
    ///
    /// # Errors
    ///
    /// Ledger errors.
    #[allow(clippy::cast_precision_loss)]
    pub fn param_importance(&self) -> Result<Vec<(String, f64)>> {
        let complete = self.ranked_complete()?;
        if complete.len() < 2 {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = Vec::new();
        for trial in &complete {
            for entry in &trial.params {
                if !names.contains(&entry.name) {
                    names.push(entry.name.clone());
                }
            }
        }

        let mut scores: Vec<(String, f64)> = names
            .into_iter()
            .map(|name| {
                let (xs, ys): (Vec<f64>, Vec<f64>) = complete
                    .iter()
                    .filter_map(|t| {
                        let entry = t.params.iter().find(|e| e.name == name)?;
                        let x = entry.value.as_f64().or_else(|| {
                            match &entry.distribution {
                                crate::distribution::Distribution::Categorical(c) => {
                                    c.index_of(&entry.value).map(|i| i as f64)
                                }
                                _ => None,
                            }
                        })?;
                        Some((x, t.value?))
                    })
                    .unzip();
                let rho = spearman(&xs, &ys).abs();
                (name, if rho.is_finite() { rho } else { 0.0 })
            })
            .collect();

        let total: f64 = scores.iter().map(|(_, s)| s).sum();
        if total > 0.0 {
            for (_, s) in &mut scores {
                *s /= total;
            }
        }
        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        Ok(scores)
    }
}
