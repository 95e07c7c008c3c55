//! Core types for the search loop.

use serde::{Deserialize, Serialize};

/// The direction of optimization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Minimize the objective value.
    Minimize,
    /// Maximize the objective value.
    Maximize,
}

impl Direction {
    /// Returns `true` if `candidate` is strictly better than `incumbent`.
    #[must_use]
    pub fn is_better(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Direction::Minimize => candidate < incumbent,
            Direction::Maximize => candidate > incumbent,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Direction::Minimize => "MINIMIZE",
            Direction::Maximize => "MAXIMIZE",
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s {
            "MINIMIZE" => Some(Direction::Minimize),
            "MAXIMIZE" => Some(Direction::Maximize),
            _ => None,
        }
    }
}

/// The state of a trial in its lifecycle.
///
/// A trial starts `Running` and moves to exactly one terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrialState {
    /// The trial is currently running.
    Running,
    /// The trial completed successfully and carries an objective value.
    Complete,
    /// The trial was stopped by the pruner.
    Pruned,
    /// The trial failed with an error.
    Failed,
}

impl TrialState {
    /// Returns `true` for `Complete`, `Pruned` and `Failed`.
    #[must_use]
    pub fn is_finished(self) -> bool {
        !matches!(self, TrialState::Running)
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            TrialState::Running => "RUNNING",
            TrialState::Complete => "COMPLETE",
            TrialState::Pruned => "PRUNED",
            TrialState::Failed => "FAILED",
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(TrialState::Running),
            "COMPLETE" => Some(TrialState::Complete),
            "PRUNED" => Some(TrialState::Pruned),
            "FAILED" => Some(TrialState::Failed),
            _ => None,
        }
    }
}

impl core::fmt::Display for TrialState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
