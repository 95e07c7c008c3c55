//! The study ledger.
//!
//! The [`Storage`] trait is the durable record of every study: trial numbers,
//! sampled hyperparameters, intermediate values and terminal states. Every
//! [`Study`](crate::Study) owns an `Arc<dyn Storage>`, so a ledger handle is
//! shared freely between the study and its running trials.
//!
//! # Available backends
//!
//! | Backend | Description |
//! |---------|-------------|
//! | [`MemoryStorage`] | Plain vectors behind a lock; tests and throwaway runs |
//! | [`SqliteStorage`] | `SQLite` file in WAL mode; survives restarts and can be shared by several processes |
//!
//! Use [`open`] to pick a backend from a connection string.

mod memory;
mod sqlite;

use std::sync::Arc;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use crate::distribution::Distribution;
use crate::error::{Error, Result};
use crate::param::ParamValue;
use crate::trial::TrialRecord;
use crate::types::{Direction, TrialState};

/// Identity of a study as recorded in the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StudyInfo {
    /// Backend-specific study key.
    pub id: i64,
    /// Study name.
    pub name: String,
    /// Optimization direction fixed at creation.
    pub direction: Direction,
    /// Objective metric identity fixed at creation.
    pub metric: String,
}

impl StudyInfo {
    /// Checks that a reopened study matches the requested direction and metric.
    ///
    /// # Errors
    ///
    /// [`Error::DirectionMismatch`] or [`Error::MetricMismatch`].
    pub fn ensure_matches(&self, direction: Direction, metric: &str) -> Result<()> {
        if self.direction != direction {
            return Err(Error::DirectionMismatch {
                study: self.name.clone(),
                stored: self.direction,
                requested: direction,
            });
        }
        if self.metric != metric {
            return Err(Error::MetricMismatch {
                expected: self.metric.clone(),
                got: metric.to_string(),
            });
        }
        Ok(())
    }
}

/// A transactional store of studies and their trials.
///
/// Implementations must be `Send + Sync`: the ledger is shared between the
/// study and its running trials, and several processes may point at the same
/// durable store.
pub trait Storage: Send + Sync {
    /// Creates the study, or reopens it if it already exists.
    ///
    /// # Errors
    ///
    /// [`Error::DirectionMismatch`] / [`Error::MetricMismatch`] when an
    /// existing study was created with a different direction or metric, and
    /// [`Error::Storage`] on backend failures.
    fn open_study(&self, name: &str, direction: Direction, metric: &str) -> Result<StudyInfo>;

    /// Looks up an existing study without creating it.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] on backend failures.
    fn load_study(&self, name: &str) -> Result<Option<StudyInfo>>;

    /// Registers a new RUNNING trial and returns its number.
    ///
    /// Numbers are assigned atomically, start at 0 and increase by one.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] on backend failures.
    fn create_trial(&self, study_id: i64) -> Result<u64>;

    /// Records one sampled hyperparameter.
    ///
    /// # Errors
    ///
    /// [`Error::TrialAlreadyFinished`] if the trial is no longer running, and
    /// [`Error::Storage`] on backend failures.
    fn set_trial_param(
        &self,
        study_id: i64,
        number: u64,
        name: &str,
        value: &ParamValue,
        distribution: &Distribution,
    ) -> Result<()>;

    /// Appends an intermediate value.
    ///
    /// # Errors
    ///
    /// [`Error::TrialAlreadyFinished`] if the trial is no longer running, and
    /// [`Error::Storage`] on backend failures.
    fn report_intermediate(&self, study_id: i64, number: u64, step: u64, value: f64)
    -> Result<()>;

    /// Moves a RUNNING trial to a terminal state.
    ///
    /// # Errors
    ///
    /// [`Error::TrialAlreadyFinished`] on a second terminal transition,
    /// [`Error::Internal`] when `state` is `Running`, and
    /// [`Error::Storage`] on backend failures.
    fn finish_trial(
        &self,
        study_id: i64,
        number: u64,
        state: TrialState,
        value: Option<f64>,
    ) -> Result<()>;

    /// Owned snapshot of all trials of the study, ordered by number.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] on backend failures.
    fn trials(&self, study_id: i64) -> Result<Vec<TrialRecord>>;
}

/// Opens a ledger from a connection string.
///
/// `sqlite:///path/to/db.sqlite3` and bare paths open a [`SqliteStorage`];
/// `memory` (or `:memory:`) gives a fresh [`MemoryStorage`].
///
/// # Errors
///
/// [`Error::Storage`] if the database cannot be opened.
///
/// # Examples
///
/// ```
/// let ledger = skin_search::storage::open("memory").unwrap();
/// # let _ = ledger;
/// ```
pub fn open(url: &str) -> Result<Arc<dyn Storage>> {
    match url {
        "memory" | ":memory:" => Ok(Arc::new(MemoryStorage::new())),
        _ => Ok(Arc::new(SqliteStorage::open(url)?)),
    }
}

pub(crate) fn check_terminal(state: TrialState) -> Result<()> {
    if state.is_finished() {
        Ok(())
    } else {
        Err(Error::Internal("a trial cannot be finished into the RUNNING state"))
    }
}
