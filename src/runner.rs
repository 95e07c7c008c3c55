//! The training runner: an explicit per-epoch state machine.
//!
//! ```text
//! Initialized -> Training -> { StoppedEarly | Pruned | Exhausted | Failed }
//! ```
//!
//! After every epoch the validation metrics are reported to the trial, then
//! [`EpochController::on_epoch_end`] applies, in this order: pruning, learning
//! rate decay, early stopping, checkpointing.

use serde::{Deserialize, Serialize};

use crate::checkpoint::{Checkpoint, FORMAT_VERSION, TrialArtifacts};
use crate::data::{DatasetProvider, Split};
use crate::error::{Error, Result};
use crate::metrics::{MonitoredMetric, accuracy, binary_cross_entropy, roc_auc};
use crate::model::{Trainable, Weights};
use crate::trial::Trial;

/// Lifecycle of one training run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Created, no epoch run yet.
    Initialized,
    /// Running epochs.
    Training,
    /// Early stopping fired; best weights restored.
    StoppedEarly,
    /// The pruner stopped the trial.
    Pruned,
    /// Every epoch of the budget ran.
    Exhausted,
    /// An error ended the run.
    Failed,
}

impl RunState {
    /// Returns `true` for the states a run can end in.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunState::Initialized | RunState::Training)
    }
}

/// Loss, accuracy and ROC-AUC over one split.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitMetrics {
    /// Mean binary cross-entropy.
    pub loss: f64,
    /// Accuracy at threshold 0.5.
    pub accuracy: f64,
    /// ROC-AUC.
    pub auc: f64,
}

impl SplitMetrics {
    fn from_predictions(probabilities: &[f64], labels: &[f64]) -> Self {
        Self {
            loss: binary_cross_entropy(probabilities, labels),
            accuracy: accuracy(probabilities, labels),
            auc: roc_auc(probabilities, labels),
        }
    }

    fn monitored(&self, metric: MonitoredMetric) -> f64 {
        match metric {
            MonitoredMetric::ValAccuracy => self.accuracy,
            MonitoredMetric::ValAuc => self.auc,
        }
    }
}

/// Everything recorded for one epoch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based epoch number.
    pub epoch: u64,
    /// Mean training-batch loss, penalties included.
    pub loss: f64,
    /// Training accuracy measured after each update.
    pub accuracy: f64,
    /// Training ROC-AUC measured after each update.
    pub auc: f64,
    /// Validation metrics.
    pub validation: SplitMetrics,
    /// Learning rate in effect during the epoch.
    pub learning_rate: f64,
}

/// Per-trial training history, written next to the checkpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    /// Trial number.
    pub trial: u64,
    /// Examples in the training split.
    pub num_train_examples: usize,
    /// Monitored metric.
    pub metric: MonitoredMetric,
    /// Per-epoch metrics.
    pub epochs: Vec<EpochRecord>,
    /// How the run ended.
    pub state: RunState,
    /// Test-split sanity check; never used for selection.
    pub test: Option<SplitMetrics>,
}

/// Outcome of a run that did not fail.
#[derive(Clone, Debug, PartialEq)]
pub struct RunOutcome {
    /// `StoppedEarly`, `Exhausted` or `Pruned`.
    pub state: RunState,
    /// Monitored metric of the last recorded epoch; `None` when pruned.
    pub value: Option<f64>,
    /// Full history.
    pub history: TrainingHistory,
}

/// Fixed inputs of the runner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Epoch budget.
    pub epochs: u64,
    /// Monitored metric (always maximized).
    pub metric: MonitoredMetric,
    /// Epochs without improvement before early stopping.
    pub early_stopping_patience: u64,
    /// Minimum change that counts as an improvement for early stopping.
    pub early_stopping_min_delta: f64,
    /// Multiplier applied to the learning rate on a plateau.
    pub lr_factor: f64,
    /// Epochs without improvement before decaying the learning rate.
    pub lr_patience: u64,
    /// Minimum change that counts as an improvement for the decay schedule.
    pub lr_min_delta: f64,
    /// Evaluate the test split after training.
    pub evaluate_test: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            metric: MonitoredMetric::ValAccuracy,
            early_stopping_patience: 3,
            early_stopping_min_delta: 0.0,
            lr_factor: 0.5,
            lr_patience: 3,
            lr_min_delta: 1e-4,
            evaluate_test: true,
        }
    }
}

/// Early stopping with best-weight restoration.
#[derive(Debug)]
struct EarlyStopping {
    patience: u64,
    min_delta: f64,
    best: f64,
    best_weights: Option<Weights>,
    wait: u64,
}

impl EarlyStopping {
    fn new(patience: u64, min_delta: f64) -> Self {
        Self {
            patience,
            min_delta,
            best: f64::NEG_INFINITY,
            best_weights: None,
            wait: 0,
        }
    }

    /// Returns `true` when training should stop.
    fn update(&mut self, value: f64, model: &dyn Trainable) -> bool {
        if value - self.min_delta > self.best {
            self.best = value;
            self.best_weights = Some(model.weights());
            self.wait = 0;
            return false;
        }
        self.wait += 1;
        self.wait >= self.patience
    }
}

/// Learning-rate decay on a plateau of the monitored metric.
#[derive(Debug)]
struct ReduceLrOnPlateau {
    factor: f64,
    patience: u64,
    min_delta: f64,
    best: f64,
    wait: u64,
}

impl ReduceLrOnPlateau {
    fn new(factor: f64, patience: u64, min_delta: f64) -> Self {
        Self {
            factor,
            patience,
            min_delta,
            best: f64::NEG_INFINITY,
            wait: 0,
        }
    }

    /// Returns the new learning rate when it changes.
    fn update(&mut self, value: f64, learning_rate: f64) -> Option<f64> {
        if value > self.best + self.min_delta {
            self.best = value;
            self.wait = 0;
            return None;
        }
        self.wait += 1;
        if self.wait >= self.patience {
            self.wait = 0;
            return Some(learning_rate * self.factor);
        }
        None
    }
}

/// What the runner does after an epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpochAction {
    /// Keep training; `checkpoint` asks for the current weights to be saved.
    Continue {
        /// The monitored metric strictly improved.
        checkpoint: bool,
    },
    /// Stop, the trial is pruned.
    Prune,
    /// Stop. The current weights are saved first when `checkpoint` is set,
    /// then [`EpochController::restore_best`] rolls the model back.
    StopEarly {
        /// The monitored metric strictly improved.
        checkpoint: bool,
    },
}

impl EpochAction {
    /// Whether the weights of this epoch should be written out.
    #[must_use]
    pub fn checkpoint(self) -> bool {
        match self {
            EpochAction::Continue { checkpoint } | EpochAction::StopEarly { checkpoint } => {
                checkpoint
            }
            EpochAction::Prune => false,
        }
    }
}

/// The per-epoch transition function.
#[derive(Debug)]
pub struct EpochController {
    early_stopping: EarlyStopping,
    plateau: ReduceLrOnPlateau,
    best_checkpointed: f64,
}

impl EpochController {
    /// A controller configured from `config`.
    #[must_use]
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            early_stopping: EarlyStopping::new(
                config.early_stopping_patience,
                config.early_stopping_min_delta,
            ),
            plateau: ReduceLrOnPlateau::new(
                config.lr_factor,
                config.lr_patience,
                config.lr_min_delta,
            ),
            best_checkpointed: f64::NEG_INFINITY,
        }
    }

    /// Applies prune, learning-rate decay, early stopping and checkpointing,
    /// in that order, for an epoch whose monitored value is `value`.
    ///
    /// The checkpoint decision is independent of early stopping: an epoch that
    /// both improves on the best checkpoint and exhausts the patience is still
    /// saved.
    pub fn on_epoch_end(
        &mut self,
        epoch: u64,
        value: f64,
        should_prune: bool,
        model: &mut dyn Trainable,
    ) -> EpochAction {
        if should_prune {
            return EpochAction::Prune;
        }

        if let Some(lr) = self.plateau.update(value, model.learning_rate()) {
            trace_info!(epoch, learning_rate = lr, "reducing learning rate");
            model.set_learning_rate(lr);
        }

        let stop = self.early_stopping.update(value, model);

        let checkpoint = value > self.best_checkpointed;
        if checkpoint {
            self.best_checkpointed = value;
        }

        if stop {
            trace_info!(epoch, best = self.early_stopping.best, "early stopping");
            return EpochAction::StopEarly { checkpoint };
        }
        #[cfg(not(feature = "tracing"))]
        let _ = epoch;
        EpochAction::Continue { checkpoint }
    }

    /// Restores the weights of the best epoch seen by early stopping.
    ///
    /// # Errors
    ///
    /// [`Error::Internal`] if the stored weights do not fit the model.
    pub fn restore_best(&mut self, model: &mut dyn Trainable) -> Result<()> {
        if let Some(best) = self.early_stopping.best_weights.take() {
            model.set_weights(best)?;
        }
        Ok(())
    }
}

/// Drives one model through its epoch budget.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use skin_search::data::{Example, InMemoryDataset};
/// use skin_search::extractor::Flatten;
/// use skin_search::model::ModelBuilder;
/// use skin_search::runner::{RunState, RunnerConfig, TrainingRunner};
/// use skin_search::Trial;
///
/// let examples: Vec<Example> = (0..20)
///     .map(|i| Example::new(vec![f64::from(i) / 10.0 - 1.0], f64::from(u8::from(i >= 10))))
///     .collect();
/// let data = InMemoryDataset::new(examples.clone(), examples, Vec::new());
///
/// let mut trial = Trial::new(0);
/// trial.suggest_int("num_dense_layers", 0, 0).unwrap();
/// trial.suggest_float("dropout", 0.1, 0.1).unwrap();
/// trial.suggest_categorical("regul", [false]).unwrap();
/// let spec = ModelBuilder::new(Arc::new(Flatten::new(1)))
///     .build(trial.config())
///     .unwrap();
///
/// let runner = TrainingRunner::new(RunnerConfig { epochs: 4, ..RunnerConfig::default() });
/// let outcome = runner
///     .run(&mut trial, &mut spec.instantiate(), &data, 4)
///     .unwrap();
/// assert_ne!(outcome.state, RunState::Pruned);
/// assert!(outcome.value.is_some());
/// ```
#[derive(Clone, Debug, Default)]
pub struct TrainingRunner {
    config: RunnerConfig,
    artifacts_root: Option<std::path::PathBuf>,
}

impl TrainingRunner {
    /// A runner without artifact output.
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            artifacts_root: None,
        }
    }

    /// Write checkpoints and histories under `<run_dir>/trial_<n>/`.
    #[must_use]
    pub fn with_artifacts(mut self, run_dir: impl Into<std::path::PathBuf>) -> Self {
        self.artifacts_root = Some(run_dir.into());
        self
    }

    /// The runner configuration.
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Trains `model` on `data` for up to `epochs` epochs, reporting each
    /// epoch's monitored metric to `trial`.
    ///
    /// # Errors
    ///
    /// [`Error::Divergence`] if a loss or metric becomes non-finite,
    /// [`Error::DataProvider`] if a batch cannot be produced, and ledger or
    /// artifact errors. The run is `Failed` in every such case.
    pub fn run(
        &self,
        trial: &mut Trial,
        model: &mut dyn Trainable,
        data: &dyn DatasetProvider,
        batch_size: usize,
    ) -> Result<RunOutcome> {
        let mut state = RunState::Initialized;
        let result = self.drive(trial, model, data, batch_size, &mut state);
        if result.is_err() {
            state = RunState::Failed;
            trace_warn!(trial = trial.number(), ?state, "training run failed");
        }
        debug_assert!(state.is_terminal());
        result
    }

    fn drive(
        &self,
        trial: &mut Trial,
        model: &mut dyn Trainable,
        data: &dyn DatasetProvider,
        batch_size: usize,
        state: &mut RunState,
    ) -> Result<RunOutcome> {
        if batch_size == 0 {
            return Err(Error::Configuration("batch_size must be at least 1".into()));
        }
        let n_train = data.len(Split::Train);
        if n_train == 0 {
            return Err(Error::DataProvider("training split is empty".into()));
        }
        let steps = (n_train / batch_size).max(1);
        let metric = self.config.metric;
        let artifacts = match &self.artifacts_root {
            Some(root) => Some(TrialArtifacts::create(root, trial.number())?),
            None => None,
        };

        let mut controller = EpochController::new(&self.config);
        let mut history = TrainingHistory {
            trial: trial.number(),
            num_train_examples: n_train,
            metric,
            epochs: Vec::new(),
            state: RunState::Training,
            test: None,
        };
        *state = RunState::Training;
        trace_info!(trial = trial.number(), steps, batch_size, "training started");

        for epoch in 1..=self.config.epochs {
            let record = Self::run_epoch(epoch, steps, batch_size, model, data)?;
            let value = record.validation.monitored(metric);
            trace_debug!(
                trial = trial.number(),
                epoch,
                loss = record.loss,
                val_loss = record.validation.loss,
                val_accuracy = record.validation.accuracy,
                val_auc = record.validation.auc,
                "epoch finished"
            );
            history.epochs.push(record);

            let should_prune = trial.report(epoch, value)?;
            let action = controller.on_epoch_end(epoch, value, should_prune, model);
            if action.checkpoint()
                && let Some(artifacts) = &artifacts
            {
                artifacts.save_checkpoint(&Checkpoint {
                    format_version: FORMAT_VERSION,
                    trial: trial.number(),
                    epoch,
                    metric: metric.as_str().to_string(),
                    value,
                    extractor: model.extractor_name().to_string(),
                    weights: model.weights(),
                })?;
            }
            match action {
                EpochAction::Prune => {
                    *state = RunState::Pruned;
                    break;
                }
                EpochAction::StopEarly { .. } => {
                    controller.restore_best(model)?;
                    *state = RunState::StoppedEarly;
                    break;
                }
                EpochAction::Continue { .. } => {}
            }
        }
        if *state == RunState::Training {
            *state = RunState::Exhausted;
        }
        history.state = *state;

        let value = if *state == RunState::Pruned {
            None
        } else {
            history
                .epochs
                .last()
                .map(|r| r.validation.monitored(metric))
        };

        if *state != RunState::Pruned && self.config.evaluate_test && !data.is_empty(Split::Test) {
            let test = evaluate(model, data, Split::Test, batch_size)?;
            trace_info!(
                trial = trial.number(),
                test_loss = test.loss,
                test_accuracy = test.accuracy,
                test_auc = test.auc,
                "test split sanity check"
            );
            history.test = Some(test);
        }

        if let Some(artifacts) = &artifacts {
            artifacts.save_history(&history)?;
        }

        Ok(RunOutcome {
            state: *state,
            value,
            history,
        })
    }

    #[allow(clippy::cast_precision_loss)]
    fn run_epoch(
        epoch: u64,
        steps: usize,
        batch_size: usize,
        model: &mut dyn Trainable,
        data: &dyn DatasetProvider,
    ) -> Result<EpochRecord> {
        let learning_rate = model.learning_rate();
        let mut loss_sum = 0.0;
        let mut n_batches = 0_usize;
        let (mut probs, mut labels) = (Vec::new(), Vec::new());

        for batch in data.batches(Split::Train, batch_size)?.take(steps) {
            let batch = batch?;
            let loss = model.train_batch(&batch)?;
            if !loss.is_finite() {
                return Err(Error::Divergence {
                    epoch,
                    what: "training loss".into(),
                    value: loss,
                });
            }
            probs.extend(model.predict(&batch.inputs));
            labels.extend_from_slice(&batch.labels);
            loss_sum += loss;
            n_batches += 1;
        }

        let validation = evaluate(model, data, Split::Validation, batch_size)?;
        for (what, value) in [
            ("validation loss", validation.loss),
            ("validation accuracy", validation.accuracy),
            ("validation auc", validation.auc),
        ] {
            if !value.is_finite() {
                return Err(Error::Divergence {
                    epoch,
                    what: what.into(),
                    value,
                });
            }
        }

        Ok(EpochRecord {
            epoch,
            loss: loss_sum / n_batches.max(1) as f64,
            accuracy: accuracy(&probs, &labels),
            auc: roc_auc(&probs, &labels),
            validation,
            learning_rate,
        })
    }
}

/// Loss, accuracy and ROC-AUC of `model` over `split`.
///
/// # Errors
///
/// [`Error::DataProvider`] if the split is empty or a batch fails.
pub fn evaluate(
    model: &dyn Trainable,
    data: &dyn DatasetProvider,
    split: Split,
    batch_size: usize,
) -> Result<SplitMetrics> {
    if data.is_empty(split) {
        return Err(Error::DataProvider(format!("{split} split is empty")));
    }
    let (mut probs, mut labels) = (Vec::new(), Vec::new());
    for batch in data.batches(split, batch_size)? {
        let batch = batch?;
        probs.extend(model.predict(&batch.inputs));
        labels.extend_from_slice(&batch.labels);
    }
    Ok(SplitMetrics::from_predictions(&probs, &labels))
}
