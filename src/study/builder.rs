use std::sync::Arc;

use crate::error::{Error, Result};
use crate::pruner::{NopPruner, Pruner};
use crate::sampler::{Sampler, TpeSampler};
use crate::storage::{MemoryStorage, Storage};
use crate::types::Direction;

use super::Study;

/// Metric identity used when none is given.
pub const DEFAULT_METRIC: &str = "val_accuracy";

/// A builder for constructing [`Study`] instances with a fluent API.
///
/// Created via [`Study::builder()`].
///
/// # Defaults
///
/// - Name: `"Skin_Problem"`
/// - Direction: [`Maximize`](Direction::Maximize)
/// - Metric: `"val_accuracy"`
/// - Sampler: [`TpeSampler`]
/// - Pruner: [`NopPruner`]
/// - Storage: [`MemoryStorage`]
///
/// # Examples
///
/// ```
/// use skin_search::prelude::*;
///
/// let study = Study::builder()
///     .name("Skin_Problem")
///     .maximize()
///     .sampler(TpeSampler::new())
///     .pruner(HyperbandPruner::new().max_resource(10))
///     .build()
///     .unwrap();
///
/// assert_eq!(study.direction(), Direction::Maximize);
/// ```
pub struct StudyBuilder {
    name: String,
    direction: Direction,
    metric: String,
    sampler: Option<Arc<dyn Sampler>>,
    pruner: Option<Arc<dyn Pruner>>,
    storage: Option<Arc<dyn Storage>>,
}

impl StudyBuilder {
    pub(super) fn new() -> Self {
        Self {
            name: "Skin_Problem".to_string(),
            direction: Direction::Maximize,
            metric: DEFAULT_METRIC.to_string(),
            sampler: None,
            pruner: None,
            storage: None,
        }
    }

    /// Set the study name, the key under which it lives in the ledger.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the optimization direction to minimize.
    #[must_use]
    pub fn minimize(mut self) -> Self {
        self.direction = Direction::Minimize;
        self
    }

    /// Set the optimization direction to maximize (the default).
    #[must_use]
    pub fn maximize(mut self) -> Self {
        self.direction = Direction::Maximize;
        self
    }

    /// Set the optimization direction explicitly.
    #[must_use]
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Set the metric identity every objective value must be measured under.
    #[must_use]
    pub fn metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = metric.into();
        self
    }

    /// Set the sampler used for parameter suggestions.
    #[must_use]
    pub fn sampler(mut self, sampler: impl Sampler + 'static) -> Self {
        self.sampler = Some(Arc::new(sampler));
        self
    }

    /// Set the pruner consulted on every intermediate report.
    #[must_use]
    pub fn pruner(mut self, pruner: impl Pruner + 'static) -> Self {
        self.pruner = Some(Arc::new(pruner));
        self
    }

    /// Set the ledger backend.
    #[must_use]
    pub fn storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storage = Some(Arc::new(storage));
        self
    }

    /// Set a ledger backend that is already shared, e.g. one returned by
    /// [`storage::open`](crate::storage::open).
    #[must_use]
    pub fn shared_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Create the study in the ledger, or load it if one with the same name
    /// already exists.
    ///
    /// # Errors
    ///
    /// [`DirectionMismatch`](crate::Error::DirectionMismatch) or
    /// [`MetricMismatch`](crate::Error::MetricMismatch) if a stored study of the
    /// same name disagrees, and [`Storage`](crate::Error::Storage) if the ledger
    /// is unreachable.
    pub fn build(self) -> Result<Study> {
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let info = storage.open_study(&self.name, self.direction, &self.metric)?;
        trace_info!(
            study = %info.name,
            direction = info.direction.as_str(),
            metric = %info.metric,
            "study ready"
        );

        Ok(Study {
            info,
            sampler: self
                .sampler
                .unwrap_or_else(|| Arc::new(TpeSampler::new())),
            pruner: self.pruner.unwrap_or_else(|| Arc::new(NopPruner)),
            storage,
        })
    }

    /// Load an existing study, keeping the direction and metric it was
    /// created with. The builder's own direction and metric are ignored.
    ///
    /// # Errors
    ///
    /// [`Storage`](crate::Error::Storage) if no study of that name exists or
    /// the ledger is unreachable.
    pub fn load(self) -> Result<Study> {
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let info = storage
            .load_study(&self.name)?
            .ok_or_else(|| Error::Storage(format!("study '{}' not found", self.name)))?;

        Ok(Study {
            info,
            sampler: self
                .sampler
                .unwrap_or_else(|| Arc::new(TpeSampler::new())),
            pruner: self.pruner.unwrap_or_else(|| Arc::new(NopPruner)),
            storage,
        })
    }
}

impl Default for StudyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
