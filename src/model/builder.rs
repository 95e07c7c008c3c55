use std::sync::Arc;

use crate::error::{Error, Result};
use crate::extractor::FeatureExtractor;
use crate::hyperparams::HyperparameterConfiguration;

use super::{Activation, DenseLayerSpec, ModelSpec, Regularization};

/// Learning rate of every candidate model.
pub const DEFAULT_LEARNING_RATE: f64 = 1e-3;

/// Turns a sampled configuration into a [`ModelSpec`].
///
/// The builder holds the inputs that do not vary between trials: the frozen
/// extractor, the learning rate and the initialization seed. `build` is a pure
/// function of those and the configuration.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use skin_search::extractor::Flatten;
/// use skin_search::model::ModelBuilder;
/// use skin_search::Trial;
///
/// let mut trial = Trial::new(0);
/// trial.suggest_int("num_dense_layers", 0, 0).unwrap();
/// trial.suggest_float("dropout", 0.1, 0.9).unwrap();
/// trial.suggest_categorical("regul", [false]).unwrap();
///
/// let spec = ModelBuilder::new(Arc::new(Flatten::new(4)))
///     .build(trial.config())
///     .unwrap();
/// assert_eq!(spec.layer_widths(), vec![1]);
/// ```
#[derive(Clone)]
pub struct ModelBuilder {
    extractor: Arc<dyn FeatureExtractor>,
    learning_rate: f64,
    seed: u64,
}

impl ModelBuilder {
    /// A builder over `extractor` with learning rate 1e-3 and seed 0.
    #[must_use]
    pub fn new(extractor: Arc<dyn FeatureExtractor>) -> Self {
        Self {
            extractor,
            learning_rate: DEFAULT_LEARNING_RATE,
            seed: 0,
        }
    }

    /// Set the initial learning rate.
    #[must_use]
    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the initialization seed.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The frozen extractor every built model starts with.
    #[must_use]
    pub fn extractor(&self) -> &Arc<dyn FeatureExtractor> {
        &self.extractor
    }

    /// Builds the network description for `config`.
    ///
    /// Reads `num_dense_layers`, `num_neurons_L1..=Ln`, `dropout`, `regul`,
    /// and, when present in the structure, `l1_weight`, `l2_weight` and
    /// `activation`.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if a required parameter is missing or mistyped,
    /// a width is below 1 or outside `[prev / 4, prev]` of its predecessor, the
    /// dropout rate is outside `[0, 1)`, or the activation is unknown.
    pub fn build(&self, config: &HyperparameterConfiguration) -> Result<ModelSpec> {
        let n_layers = config.int("num_dense_layers")?;
        let n_layers = usize::try_from(n_layers).map_err(|_| {
            Error::Configuration(format!("num_dense_layers must be >= 0, got {n_layers}"))
        })?;

        let mut widths = Vec::with_capacity(n_layers);
        for i in 1..=n_layers {
            let name = format!("num_neurons_L{i}");
            let width = config.int(&name)?;
            if width < 1 {
                return Err(Error::Configuration(format!(
                    "{name} must be at least 1, got {width}"
                )));
            }
            if let Some(&prev) = widths.last()
                && (width > prev || width < prev / 4)
            {
                return Err(Error::Configuration(format!(
                    "{name} = {width} is outside [{}, {prev}] set by num_neurons_L{}",
                    prev / 4,
                    i - 1
                )));
            }
            widths.push(width);
        }

        let dropout = config.float("dropout")?;
        if !(0.0..1.0).contains(&dropout) {
            return Err(Error::Configuration(format!(
                "dropout must be in [0, 1), got {dropout}"
            )));
        }

        let regularization = if config.bool("regul")? {
            Some(Regularization {
                l1: non_negative(config.float("l1_weight")?, "l1_weight")?,
                l2: non_negative(config.float("l2_weight")?, "l2_weight")?,
            })
        } else {
            None
        };

        let activation = if n_layers > 0 {
            config.str("activation")?.parse::<Activation>()?
        } else {
            Activation::Tanh
        };

        let hidden = widths
            .into_iter()
            .map(|units| {
                usize::try_from(units)
                    .map(|units| DenseLayerSpec {
                        units,
                        activation,
                        dropout,
                        regularization,
                    })
                    .map_err(|_| Error::Internal("width checked positive"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ModelSpec {
            extractor: Arc::clone(&self.extractor),
            hidden,
            output_regularization: regularization,
            learning_rate: self.learning_rate,
            seed: self.seed,
        })
    }
}

fn non_negative(value: f64, name: &str) -> Result<f64> {
    if value >= 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(Error::Configuration(format!(
            "{name} must be a finite non-negative number, got {value}"
        )))
    }
}
