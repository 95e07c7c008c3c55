//! Search spaces: which hyperparameters a trial samples, and in what order.

use crate::error::Result;
use crate::hyperparams::HyperparameterConfiguration;
use crate::model::Activation;
use crate::parameter::{BoolParam, CategoricalParam, FloatParam, IntParam, Parameter};
use crate::trial::Trial;

/// A catalog of hyperparameters.
///
/// `sample` draws every parameter through the trial, so later domains may
/// depend on values drawn earlier and every draw lands in the ledger.
pub trait SearchSpace: Send + Sync {
    /// Samples a full configuration into `trial` and returns it.
    ///
    /// # Errors
    ///
    /// Parameter validation or ledger errors from [`Trial::suggest_param`].
    fn sample(&self, trial: &mut Trial) -> Result<HyperparameterConfiguration>;
}

/// The default catalog: a dense head of up to three non-widening layers.
///
/// | name | domain | condition |
/// |------|--------|-----------|
/// | `batch_size` | int `[1, 15]` | |
/// | `num_dense_layers` | int `[0, 3]` | |
/// | `num_neurons_L1` | int `[10, 300]` | layers > 0 |
/// | `num_neurons_L{i}` | int `[L{i-1} / 4, L{i-1}]` | layers ≥ i |
/// | `dropout` | float `[0.1, 0.9]` | |
/// | `regul` | bool | |
/// | `l1_weight`, `l2_weight` | `{0, 1e-4, 1e-2}` | `regul` |
/// | `activation` | `{tanh, elu, swish}` | layers > 0 |
#[derive(Clone, Debug)]
pub struct DenseHeadSpace {
    max_batch_size: i64,
    max_layers: i64,
    first_layer: (i64, i64),
}

impl DenseHeadSpace {
    /// The catalog with its default bounds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_batch_size: 15,
            max_layers: 3,
            first_layer: (10, 300),
        }
    }
}

impl Default for DenseHeadSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchSpace for DenseHeadSpace {
    fn sample(&self, trial: &mut Trial) -> Result<HyperparameterConfiguration> {
        IntParam::new("batch_size", 1, self.max_batch_size).suggest(trial)?;
        let n_layers = IntParam::new("num_dense_layers", 0, self.max_layers).suggest(trial)?;

        if n_layers > 0 {
            let (low, high) = self.first_layer;
            let mut prev = IntParam::new("num_neurons_L1", low, high).suggest(trial)?;
            for i in 2..=n_layers {
                prev = IntParam::new(format!("num_neurons_L{i}"), prev / 4, prev).suggest(trial)?;
            }
        }

        FloatParam::new("dropout", 0.1, 0.9).suggest(trial)?;
        if BoolParam::new("regul").suggest(trial)? {
            for name in ["l1_weight", "l2_weight"] {
                CategoricalParam::new(name, [0.0, 1e-4, 1e-2]).suggest(trial)?;
            }
        }
        if n_layers > 0 {
            CategoricalParam::new("activation", Activation::HIDDEN.map(Activation::as_str))
                .suggest(trial)?;
        }

        trace_info!(trial = trial.number(), params = %trial.config(), "trial hyperparameters");
        Ok(trial.config().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::Flatten;
    use crate::model::ModelBuilder;

    #[test]
    fn sampled_configurations_respect_the_structure() {
        let builder = ModelBuilder::new(std::sync::Arc::new(Flatten::new(4)));
        let space = DenseHeadSpace::new();
        for n in 0..200 {
            let mut trial = Trial::new(n);
            let config = space.sample(&mut trial).unwrap();

            let layers = config.int("num_dense_layers").unwrap();
            let mut prev = i64::MAX;
            let mut collapsed = false;
            for i in 1..=layers {
                let w = config.int(&format!("num_neurons_L{i}")).unwrap();
                assert!(w <= prev && w >= 0);
                collapsed |= w == 0;
                prev = w;
            }
            assert_eq!(config.contains("activation"), layers > 0);
            assert_eq!(
                config.contains("l1_weight"),
                config.bool("regul").unwrap()
            );
            let bs = config.int("batch_size").unwrap();
            assert!((1..=15).contains(&bs));

            // A narrow second layer can leave [0, 1] for the third.
            match builder.build(&config) {
                Ok(spec) => assert_eq!(spec.hidden.len(), usize::try_from(layers).unwrap()),
                Err(e) => {
                    assert!(collapsed, "unexpected build failure: {e}");
                    assert!(e.is_trial_fatal());
                }
            }
        }
    }

    #[test]
    fn sampling_order_is_declaration_order() {
        let mut trial = Trial::new(0);
        let config = DenseHeadSpace::new().sample(&mut trial).unwrap();
        let names: Vec<&str> = config.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(&names[..2], &["batch_size", "num_dense_layers"]);
    }
}
