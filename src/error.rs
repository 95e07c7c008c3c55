/// Errors produced by the search loop, the ledger and the training runner.
///
/// Variants fall into two groups. Trial-fatal errors end the current trial,
/// which is recorded as [`Failed`](crate::TrialState::Failed), and the search
/// moves on. Study-fatal errors abort the whole run. See
/// [`Error::is_trial_fatal`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when the lower bound is greater than the upper bound.
    #[error("invalid bounds for '{name}': low ({low}) must be less than or equal to high ({high})")]
    InvalidBounds {
        /// The parameter name.
        name: String,
        /// The lower bound value.
        low: f64,
        /// The upper bound value.
        high: f64,
    },

    /// Returned when categorical choices are empty.
    #[error("categorical choices for '{0}' cannot be empty")]
    EmptyChoices(String),

    /// Returned when a parameter is suggested twice with different domains.
    #[error("parameter conflict for '{name}': {reason}")]
    ParameterConflict {
        /// The name of the conflicting parameter.
        name: String,
        /// The reason for the conflict.
        reason: String,
    },

    /// A hyperparameter is missing, mistyped, or violates a structural constraint.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Reading or decoding a batch failed.
    #[error("data provider error: {0}")]
    DataProvider(String),

    /// A loss or metric became NaN or infinite.
    #[error("divergence at epoch {epoch}: {what} is not finite ({value})")]
    Divergence {
        /// Epoch (1-based) at which the divergence was observed.
        epoch: u64,
        /// Which quantity diverged.
        what: String,
        /// The offending value.
        value: f64,
    },

    /// An intermediate value was reported at a step that is not strictly
    /// greater than the previous one.
    #[error("intermediate step {step} must be greater than the last reported step {last}")]
    NonIncreasingStep {
        /// The step being reported.
        step: u64,
        /// The last step already on the curve.
        last: u64,
    },

    /// An objective measured under a different metric was offered to a study.
    #[error("metric mismatch: study optimizes '{expected}' but got '{got}'")]
    MetricMismatch {
        /// The study's metric identity.
        expected: String,
        /// The metric that was offered.
        got: String,
    },

    /// A stored study was reopened with a different direction.
    #[error("direction mismatch: study '{study}' was created to {stored:?}, not {requested:?}")]
    DirectionMismatch {
        /// The study name.
        study: String,
        /// Direction recorded in the ledger.
        stored: crate::Direction,
        /// Direction requested by the caller.
        requested: crate::Direction,
    },

    /// Returned when requesting the best trial but no trials have completed.
    #[error("no completed trials available")]
    NoCompletedTrials,

    /// A trial that already reached a terminal state was finalized again.
    #[error("trial {0} is already finished")]
    TrialAlreadyFinished(u64),

    /// Returned when a trial is pruned (stopped early by the pruner).
    #[error("trial was pruned")]
    TrialPruned,

    /// Returned when a storage operation fails.
    #[error("storage error: {0}")]
    Storage(String),

    /// Reading or writing a run artifact (checkpoint, history, report) failed.
    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when an internal invariant is violated.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl Error {
    /// Returns `true` if the error only invalidates the current trial.
    ///
    /// The search loop records such trials as failed and continues with the
    /// next proposal. Every other error (ledger failures, metric or direction
    /// mismatches, double finalization) aborts the study.
    #[must_use]
    pub fn is_trial_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidBounds { .. }
                | Error::EmptyChoices(_)
                | Error::ParameterConflict { .. }
                | Error::Configuration(_)
                | Error::DataProvider(_)
                | Error::Divergence { .. }
                | Error::NonIncreasingStep { .. }
        )
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// Convenience type for signalling a pruned trial from an objective function.
///
/// Implements `Into<Error>` so it can be used with `?` in objectives that
/// return `Result<f64, Error>`.
///
/// # Examples
///
/// ```
/// use skin_search::{Error, TrialPruned};
///
/// fn objective_that_prunes() -> Result<f64, Error> {
///     Err(TrialPruned)?
/// }
/// ```
#[derive(Debug)]
pub struct TrialPruned;

impl core::fmt::Display for TrialPruned {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "trial was pruned")
    }
}

impl From<TrialPruned> for Error {
    fn from(_: TrialPruned) -> Self {
        Error::TrialPruned
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::DataProvider(e.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
