//! The search loop wired together: sample, build, train, score.
//!
//! [`ClassifierObjective`] is the [`Objective`] the binary optimizes. Each
//! evaluation samples a configuration from a [`SearchSpace`], materializes it
//! with a [`ModelBuilder`], and hands the resulting network to a
//! [`TrainingRunner`] that reports every epoch back to the trial.

use std::sync::Arc;

use crate::context::RunContext;
use crate::data::DatasetProvider;
use crate::error::{Error, Result};
use crate::extractor::FeatureExtractor;
use crate::model::ModelBuilder;
use crate::objective::Objective;
use crate::pruner::HyperbandPruner;
use crate::runner::{RunState, TrainingRunner};
use crate::sampler::TpeSampler;
use crate::settings::SearchConfig;
use crate::space::{DenseHeadSpace, SearchSpace};
use crate::study::{OptimizeSummary, Study};
use crate::trial::Trial;

/// Trains one classifier per trial and scores it on the validation split.
pub struct ClassifierObjective {
    space: Box<dyn SearchSpace>,
    builder: ModelBuilder,
    data: Arc<dyn DatasetProvider>,
    runner: TrainingRunner,
}

impl ClassifierObjective {
    /// Combines the four collaborators of one evaluation.
    #[must_use]
    pub fn new(
        space: Box<dyn SearchSpace>,
        builder: ModelBuilder,
        data: Arc<dyn DatasetProvider>,
        runner: TrainingRunner,
    ) -> Self {
        Self {
            space,
            builder,
            data,
            runner,
        }
    }
}

impl Objective for ClassifierObjective {
    fn metric(&self) -> &str {
        self.runner.config().metric.as_str()
    }

    fn evaluate(&self, trial: &mut Trial) -> Result<f64> {
        let config = self.space.sample(trial)?;
        let mut spec = self.builder.build(&config)?;
        spec.seed = spec.seed.wrapping_add(trial.number());

        let batch_size = config.int("batch_size")?;
        let batch_size = usize::try_from(batch_size).map_err(|_| {
            Error::Configuration(format!("batch_size must be positive, got {batch_size}"))
        })?;

        let mut model = spec.instantiate();
        let outcome = self
            .runner
            .run(trial, &mut model, self.data.as_ref(), batch_size)?;
        if outcome.state == RunState::Pruned {
            return Err(Error::TrialPruned);
        }
        outcome
            .value
            .ok_or(Error::Internal("training run ended without a monitored value"))
    }
}

/// Creates or reopens the study described by `config`: TPE proposals,
/// Hyperband pruning over the epoch budget, and the configured ledger.
///
/// # Errors
///
/// [`Error::Configuration`] if `config` does not validate, and the ledger
/// errors of [`StudyBuilder::build`](crate::StudyBuilder::build).
pub fn open_study(config: &SearchConfig) -> Result<Study> {
    config.validate()?;

    let mut tpe = TpeSampler::builder()
        .gamma(config.tpe.gamma)
        .n_startup_trials(config.tpe.n_startup_trials)
        .n_ei_candidates(config.tpe.n_ei_candidates);
    if let Some(seed) = config.seed {
        tpe = tpe.seed(seed);
    }
    let pruner = HyperbandPruner::new()
        .min_resource(config.hyperband.min_resource)
        .max_resource(config.epochs)
        .reduction_factor(config.hyperband.reduction_factor)
        .direction(config.direction);

    Study::builder()
        .name(&config.study_name)
        .direction(config.direction)
        .metric(config.metric.as_str())
        .sampler(tpe.build())
        .pruner(pruner)
        .shared_storage(crate::storage::open(&config.storage)?)
        .build()
}

/// Runs `config.n_trials` trials of the default dense-head search space,
/// writing per-trial artifacts into `context`.
///
/// # Errors
///
/// Study-fatal errors from [`Study::optimize`].
pub fn run_search(
    study: &Study,
    config: &SearchConfig,
    extractor: Arc<dyn FeatureExtractor>,
    data: Arc<dyn DatasetProvider>,
    context: &RunContext,
) -> Result<OptimizeSummary> {
    let mut builder = ModelBuilder::new(extractor).learning_rate(config.learning_rate);
    if let Some(seed) = config.seed {
        builder = builder.seed(seed);
    }
    let objective = ClassifierObjective::new(
        Box::new(DenseHeadSpace::new()),
        builder,
        data,
        TrainingRunner::new(config.runner()).with_artifacts(context.dir()),
    );
    trace_info!(
        study = study.name(),
        n_trials = config.n_trials,
        epochs = config.epochs,
        metric = %config.metric,
        "search started"
    );
    study.optimize(config.n_trials, &objective)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Example, InMemoryDataset};
    use crate::extractor::Flatten;
    use crate::metrics::MonitoredMetric;
    use crate::types::TrialState;

    fn separable() -> Arc<InMemoryDataset> {
        let examples: Vec<Example> = (0..24)
            .map(|i| {
                let x = f64::from(i) / 12.0 - 1.0;
                Example::new(vec![x, -x], f64::from(u8::from(i >= 12)))
            })
            .collect();
        Arc::new(InMemoryDataset::new(examples.clone(), examples.clone(), examples).with_seed(5))
    }

    fn config() -> SearchConfig {
        SearchConfig {
            storage: "memory".into(),
            study_name: "search-unit".into(),
            n_trials: 4,
            epochs: 3,
            seed: Some(11),
            ..SearchConfig::default()
        }
    }

    #[test]
    fn objective_reports_the_runner_metric() {
        let runner = TrainingRunner::new(crate::runner::RunnerConfig {
            metric: MonitoredMetric::ValAuc,
            ..Default::default()
        });
        let objective = ClassifierObjective::new(
            Box::new(DenseHeadSpace::new()),
            ModelBuilder::new(Arc::new(Flatten::new(2))),
            separable(),
            runner,
        );
        assert_eq!(objective.metric(), "val_auc");
    }

    #[test]
    fn open_study_rejects_invalid_config() {
        let config = SearchConfig {
            n_trials: 0,
            ..config()
        };
        assert!(matches!(open_study(&config), Err(Error::Configuration(_))));
    }

    #[test]
    fn small_search_finalizes_every_trial() {
        let config = config();
        let study = open_study(&config).unwrap();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let root = std::env::temp_dir().join(format!("skin_search_unit_{nanos}"));
        let context = RunContext::create(&root).unwrap();

        let summary = run_search(
            &study,
            &config,
            Arc::new(Flatten::new(2)),
            separable(),
            &context,
        )
        .unwrap();

        assert_eq!(summary.completed + summary.pruned + summary.failed, 4);
        let trials = study.trials().unwrap();
        assert_eq!(trials.len(), 4);
        assert!(trials.iter().all(|t| t.state != TrialState::Running));
        for t in trials.iter().filter(|t| t.state == TrialState::Complete) {
            assert!(t.value.is_some());
            assert!(context.dir().join(format!("trial_{}", t.number)).exists());
        }
        std::fs::remove_dir_all(&root).unwrap();
    }
}
