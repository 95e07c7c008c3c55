//! The [`Objective`] trait defines what gets optimized.
//!
//! An objective turns a trial into a score under one named metric. The study
//! refuses objectives whose metric differs from the one it was created with,
//! so values measured in different ways never end up in the same ranking.
//!
//! ```
//! use skin_search::objective::from_fn;
//! use skin_search::{Direction, Error, Study};
//!
//! let study = Study::builder()
//!     .name("quadratic")
//!     .direction(Direction::Minimize)
//!     .metric("loss")
//!     .build()
//!     .unwrap();
//!
//! let objective = from_fn("loss", |trial| {
//!     let x = trial.suggest_float("x", -10.0, 10.0)?;
//!     Ok::<_, Error>((x - 3.0).powi(2))
//! });
//! study.optimize(20, &objective).unwrap();
//! assert!(study.best_value().unwrap() >= 0.0);
//! ```

use crate::error::Result;
use crate::trial::Trial;

/// Something a [`Study`](crate::Study) can optimize.
pub trait Objective {
    /// Identity of the metric returned by [`evaluate`](Objective::evaluate),
    /// for example `"val_accuracy"`.
    fn metric(&self) -> &str;

    /// Samples hyperparameters on `trial`, trains, and returns the score.
    ///
    /// # Errors
    ///
    /// Trial-fatal errors (see [`Error::is_trial_fatal`](crate::Error::is_trial_fatal))
    /// mark the trial failed and the search continues.
    /// [`Error::TrialPruned`](crate::Error::TrialPruned) marks it pruned.
    /// Anything else aborts the search.
    fn evaluate(&self, trial: &mut Trial) -> Result<f64>;
}

/// An [`Objective`] built from a metric name and a closure.
pub struct FnObjective<F> {
    metric: String,
    f: F,
}

/// Wraps a closure as an objective reporting `metric`.
pub fn from_fn<F>(metric: impl Into<String>, f: F) -> FnObjective<F>
where
    F: Fn(&mut Trial) -> Result<f64>,
{
    FnObjective {
        metric: metric.into(),
        f,
    }
}

impl<F> Objective for FnObjective<F>
where
    F: Fn(&mut Trial) -> Result<f64>,
{
    fn metric(&self) -> &str {
        &self.metric
    }

    fn evaluate(&self, trial: &mut Trial) -> Result<f64> {
        (self.f)(trial)
    }
}
