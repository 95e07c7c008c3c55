//! The trainable classifier: a frozen extractor followed by a dense head.
//!
//! [`ModelBuilder`] turns a sampled configuration into a [`ModelSpec`], which
//! is a plain description of the network. [`ModelSpec::instantiate`] creates
//! a fresh [`DenseClassifier`] from it.

mod activation;
mod builder;
mod network;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use activation::Activation;
pub use builder::ModelBuilder;
pub use network::DenseClassifier;

use crate::data::Batch;
use crate::error::Result;
use crate::extractor::FeatureExtractor;

/// L1/L2 penalties of one dense layer.
///
/// The kernel gets `l1·|w| + l2·w²`, the bias `l2·b²`, and the layer output
/// `l2·a²`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Regularization {
    /// L1 factor on the kernel.
    pub l1: f64,
    /// L2 factor on kernel, bias and activity.
    pub l2: f64,
}

impl Regularization {
    /// Returns `true` if both factors are zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.l1 == 0.0 && self.l2 == 0.0
    }
}

/// One hidden dense block: dense layer, activation, dropout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DenseLayerSpec {
    /// Number of units.
    pub units: usize,
    /// Activation applied to the layer output.
    pub activation: Activation,
    /// Dropout rate applied after the activation while training.
    pub dropout: f64,
    /// Optional penalties.
    pub regularization: Option<Regularization>,
}

/// A complete, buildable description of the classifier.
#[derive(Clone)]
pub struct ModelSpec {
    /// Frozen feature extractor.
    pub extractor: Arc<dyn FeatureExtractor>,
    /// Hidden blocks, input side first.
    pub hidden: Vec<DenseLayerSpec>,
    /// Penalties of the sigmoid output unit.
    pub output_regularization: Option<Regularization>,
    /// Initial Adam learning rate.
    pub learning_rate: f64,
    /// Seed for weight initialization and dropout masks.
    pub seed: u64,
}

impl core::fmt::Debug for ModelSpec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModelSpec")
            .field("extractor", &self.extractor.name())
            .field("hidden", &self.hidden)
            .field("output_regularization", &self.output_regularization)
            .field("learning_rate", &self.learning_rate)
            .field("seed", &self.seed)
            .finish()
    }
}

impl ModelSpec {
    /// Widths of every trainable layer, output unit included.
    #[must_use]
    pub fn layer_widths(&self) -> Vec<usize> {
        self.hidden.iter().map(|l| l.units).chain([1]).collect()
    }

    /// Number of trainable weights and biases.
    #[must_use]
    pub fn n_parameters(&self) -> usize {
        let mut n_in = self.extractor.output_dim();
        let mut total = 0;
        for width in self.layer_widths() {
            total += n_in * width + width;
            n_in = width;
        }
        total
    }

    /// Creates a freshly initialized classifier.
    #[must_use]
    pub fn instantiate(&self) -> DenseClassifier {
        DenseClassifier::new(self)
    }
}

/// Weights and biases of one dense layer, kernel stored row-major as
/// `n_in × n_out`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerWeights {
    /// Input width.
    pub n_in: usize,
    /// Output width.
    pub n_out: usize,
    /// Kernel.
    pub kernel: Vec<f64>,
    /// Bias.
    pub bias: Vec<f64>,
}

/// All trainable state of a classifier, output layer last.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    /// Layers, input side first.
    pub layers: Vec<LayerWeights>,
}

/// A model the training runner can drive.
pub trait Trainable {
    /// One optimizer step on `batch`; returns the batch loss including
    /// regularization penalties.
    ///
    /// # Errors
    ///
    /// [`DataProvider`](crate::Error::DataProvider) if an input has the wrong
    /// length.
    fn train_batch(&mut self, batch: &Batch) -> Result<f64>;

    /// Positive-class probabilities, dropout disabled.
    fn predict(&self, inputs: &[Vec<f64>]) -> Vec<f64>;

    /// Name of the frozen extractor in front of the trainable part.
    fn extractor_name(&self) -> &str;

    /// Current learning rate.
    fn learning_rate(&self) -> f64;

    /// Replaces the learning rate.
    fn set_learning_rate(&mut self, learning_rate: f64);

    /// Copies out the trainable state.
    fn weights(&self) -> Weights;

    /// Restores state produced by [`weights`](Self::weights).
    ///
    /// # Errors
    ///
    /// [`Internal`](crate::Error::Internal) if the shapes do not match.
    fn set_weights(&mut self, weights: Weights) -> Result<()>;
}
