#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Hyperparameter search for a binary image classifier.
//!
//! A sequential model-based search: a Tree-structured Parzen Estimator proposes
//! configurations for a dense classification head on top of a frozen feature
//! extractor, each configuration is trained with early stopping, learning-rate
//! decay and Hyperband pruning, and the validation metric is fed back into a
//! durable `SQLite` study ledger.
//!
//! # Getting Started
//!
//! ```
//! use skin_search::prelude::*;
//!
//! let study = Study::builder()
//!     .name("quadratic")
//!     .minimize()
//!     .metric("loss")
//!     .build()
//!     .unwrap();
//!
//! let x = FloatParam::new("x", -10.0, 10.0);
//! let objective = skin_search::objective::from_fn("loss", |trial| {
//!     let v = x.suggest(trial)?;
//!     Ok((v - 3.0).powi(2))
//! });
//! study.optimize(30, &objective).unwrap();
//!
//! let best = study.best_trial().unwrap();
//! println!("#{} x = {}", best.number, best.params.float("x").unwrap());
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`Study`] | Drives the search: creates trials, records outcomes, answers "what is best". |
//! | [`Trial`] | One configuration being sampled and trained. |
//! | [`SearchSpace`](space::SearchSpace) | Declares which hyperparameters a trial samples, in order. |
//! | [`Sampler`](sampler::Sampler) | Strategy for choosing values ([`TpeSampler`](sampler::TpeSampler), [`RandomSampler`](sampler::RandomSampler)). |
//! | [`Pruner`](pruner::Pruner) | Decides at each epoch whether a trial should stop ([`HyperbandPruner`](pruner::HyperbandPruner)). |
//! | [`Storage`](storage::Storage) | The study ledger ([`SqliteStorage`](storage::SqliteStorage), [`MemoryStorage`](storage::MemoryStorage)). |
//! | [`TrainingRunner`](runner::TrainingRunner) | Per-epoch state machine around a [`Trainable`](model::Trainable). |
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at trial and epoch boundaries | off |
//! | `cli` | The `skin-search` binary (enables `tracing`) | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::warn!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn {
    ($($arg:tt)*) => {};
}

pub mod checkpoint;
pub mod context;
mod curve;
pub mod data;
mod distribution;
mod error;
pub mod extractor;
mod hyperparams;
mod importance;
mod kde;
pub mod metrics;
pub mod model;
pub mod objective;
mod param;
pub mod parameter;
pub mod pruner;
pub mod report;
mod rng_util;
pub mod runner;
pub mod sampler;
pub mod search;
pub mod settings;
pub mod space;
pub mod storage;
mod study;
mod trial;
mod types;

pub use curve::MetricCurve;
pub use distribution::{
    CategoricalDistribution, Distribution, FloatDistribution, IntDistribution,
};
pub use error::{Error, Result, TrialPruned};
pub use hyperparams::{HyperparameterConfiguration, ParamEntry};
pub use objective::Objective;
pub use param::ParamValue;
pub use study::{OptimizeSummary, Study, StudyBuilder};
pub use trial::{Trial, TrialRecord};
pub use types::{Direction, TrialState};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use skin_search::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result, TrialPruned};
    pub use crate::hyperparams::HyperparameterConfiguration;
    pub use crate::objective::Objective;
    pub use crate::param::ParamValue;
    pub use crate::parameter::{BoolParam, CategoricalParam, FloatParam, IntParam, Parameter};
    pub use crate::pruner::{HyperbandPruner, NopPruner, Pruner, SuccessiveHalvingPruner};
    pub use crate::runner::{RunOutcome, TrainingRunner};
    pub use crate::sampler::{RandomSampler, Sampler, TpeSampler};
    pub use crate::space::{DenseHeadSpace, SearchSpace};
    pub use crate::storage::{MemoryStorage, SqliteStorage, Storage};
    pub use crate::study::{OptimizeSummary, Study, StudyBuilder};
    pub use crate::trial::{Trial, TrialRecord};
    pub use crate::types::{Direction, TrialState};
}
