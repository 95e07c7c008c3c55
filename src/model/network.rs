use std::sync::Arc;

use crate::data::Batch;
use crate::error::{Error, Result};
use crate::extractor::FeatureExtractor;
use crate::rng_util::f64_range;

use super::{Activation, LayerWeights, ModelSpec, Regularization, Trainable, Weights};

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-7;
const PROB_EPSILON: f64 = 1e-7;

struct DenseLayer {
    n_in: usize,
    n_out: usize,
    kernel: Vec<f64>,
    bias: Vec<f64>,
    activation: Activation,
    dropout: f64,
    regularization: Option<Regularization>,
    m_kernel: Vec<f64>,
    v_kernel: Vec<f64>,
    m_bias: Vec<f64>,
    v_bias: Vec<f64>,
}

impl DenseLayer {
    /// Glorot-uniform kernel, zero bias.
    #[allow(clippy::cast_precision_loss)]
    fn new(
        n_in: usize,
        n_out: usize,
        activation: Activation,
        dropout: f64,
        regularization: Option<Regularization>,
        rng: &mut fastrand::Rng,
    ) -> Self {
        let limit = (6.0 / (n_in + n_out) as f64).sqrt();
        let kernel = (0..n_in * n_out)
            .map(|_| f64_range(rng, -limit, limit))
            .collect();
        Self {
            n_in,
            n_out,
            kernel,
            bias: vec![0.0; n_out],
            activation,
            dropout,
            regularization,
            m_kernel: vec![0.0; n_in * n_out],
            v_kernel: vec![0.0; n_in * n_out],
            m_bias: vec![0.0; n_out],
            v_bias: vec![0.0; n_out],
        }
    }

    fn pre_activation(&self, input: &[f64]) -> Vec<f64> {
        let mut z = self.bias.clone();
        for (i, &x) in input.iter().enumerate() {
            if x == 0.0 {
                continue;
            }
            let row = &self.kernel[i * self.n_out..(i + 1) * self.n_out];
            for (zj, &w) in z.iter_mut().zip(row) {
                *zj += x * w;
            }
        }
        z
    }

    /// Penalty of kernel and bias.
    fn weight_penalty(&self) -> f64 {
        self.regularization.map_or(0.0, |r| {
            let kernel: f64 = self
                .kernel
                .iter()
                .map(|w| r.l1 * w.abs() + r.l2 * w * w)
                .sum();
            let bias: f64 = self.bias.iter().map(|b| r.l2 * b * b).sum();
            kernel + bias
        })
    }
}

/// Everything the backward pass needs from one forward pass.
struct Trace {
    /// Inputs of each layer (features first), after dropout.
    inputs: Vec<Vec<f64>>,
    /// Pre-activations of each layer.
    pre: Vec<Vec<f64>>,
    /// Activations before dropout.
    post: Vec<Vec<f64>>,
    /// Inverted-dropout multipliers per hidden layer (empty when disabled).
    masks: Vec<Vec<f64>>,
}

/// A dense head with a sigmoid output on top of a frozen extractor.
///
/// Trained with Adam (β₁ 0.9, β₂ 0.999, ε 1e-7) on binary cross-entropy plus
/// the configured L1/L2 penalties. Dropout is inverted: surviving units are
/// scaled by `1 / (1 - rate)` during training and nothing happens at
/// prediction time.
pub struct DenseClassifier {
    extractor: Arc<dyn FeatureExtractor>,
    layers: Vec<DenseLayer>,
    learning_rate: f64,
    step: i32,
    rng: fastrand::Rng,
}

impl DenseClassifier {
    pub(super) fn new(spec: &ModelSpec) -> Self {
        let mut rng = fastrand::Rng::with_seed(spec.seed);
        let mut n_in = spec.extractor.output_dim();
        let mut layers = Vec::with_capacity(spec.hidden.len() + 1);
        for hidden in &spec.hidden {
            layers.push(DenseLayer::new(
                n_in,
                hidden.units,
                hidden.activation,
                hidden.dropout,
                hidden.regularization,
                &mut rng,
            ));
            n_in = hidden.units;
        }
        layers.push(DenseLayer::new(
            n_in,
            1,
            Activation::Sigmoid,
            0.0,
            spec.output_regularization,
            &mut rng,
        ));
        Self {
            extractor: Arc::clone(&spec.extractor),
            layers,
            learning_rate: spec.learning_rate,
            step: 0,
            rng,
        }
    }

    fn features(&self, input: &[f64]) -> Result<Vec<f64>> {
        if input.len() != self.extractor.input_dim() {
            return Err(Error::DataProvider(format!(
                "input has {} values, extractor '{}' expects {}",
                input.len(),
                self.extractor.name(),
                self.extractor.input_dim()
            )));
        }
        Ok(self.extractor.extract(input))
    }

    fn forward(&mut self, features: Vec<f64>, training: bool) -> Trace {
        let mut trace = Trace {
            inputs: Vec::with_capacity(self.layers.len()),
            pre: Vec::with_capacity(self.layers.len()),
            post: Vec::with_capacity(self.layers.len()),
            masks: Vec::with_capacity(self.layers.len()),
        };
        let mut x = features;
        for layer in &self.layers {
            let z = layer.pre_activation(&x);
            let a: Vec<f64> = z.iter().map(|&v| layer.activation.apply(v)).collect();
            let mask: Vec<f64> = if training && layer.dropout > 0.0 {
                let keep = 1.0 - layer.dropout;
                (0..a.len())
                    .map(|_| if self.rng.f64() < keep { 1.0 / keep } else { 0.0 })
                    .collect()
            } else {
                Vec::new()
            };
            let next = if mask.is_empty() {
                a.clone()
            } else {
                a.iter().zip(&mask).map(|(v, m)| v * m).collect()
            };
            trace.inputs.push(x);
            trace.pre.push(z);
            trace.post.push(a);
            trace.masks.push(mask);
            x = next;
        }
        trace
    }

    fn probability(trace: &Trace) -> f64 {
        trace
            .post
            .last()
            .and_then(|out| out.first())
            .copied()
            .unwrap_or(0.5)
    }

    fn apply_adam(&mut self, grads: &[(Vec<f64>, Vec<f64>)]) {
        self.step = self.step.saturating_add(1);
        let correction1 = 1.0 - BETA1.powi(self.step);
        let correction2 = 1.0 - BETA2.powi(self.step);
        let lr = self.learning_rate * correction2.sqrt() / correction1;
        let update = |w: &mut f64, m: &mut f64, v: &mut f64, g: f64| {
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            *w -= lr * *m / (v.sqrt() + ADAM_EPSILON);
        };
        for (layer, (gk, gb)) in self.layers.iter_mut().zip(grads) {
            let kernel = layer
                .kernel
                .iter_mut()
                .zip(&mut layer.m_kernel)
                .zip(&mut layer.v_kernel)
                .zip(gk);
            for (((w, m), v), &g) in kernel {
                update(w, m, v, g);
            }
            let bias = layer
                .bias
                .iter_mut()
                .zip(&mut layer.m_bias)
                .zip(&mut layer.v_bias)
                .zip(gb);
            for (((b, m), v), &g) in bias {
                update(b, m, v, g);
            }
        }
    }
}

/// Subgradient of `|w|`, zero at zero.
fn l1_grad(w: f64) -> f64 {
    if w > 0.0 {
        1.0
    } else if w < 0.0 {
        -1.0
    } else {
        0.0
    }
}

impl Trainable for DenseClassifier {
    #[allow(clippy::cast_precision_loss)]
    fn train_batch(&mut self, batch: &Batch) -> Result<f64> {
        if batch.is_empty() {
            return Ok(0.0);
        }
        let mut grads: Vec<(Vec<f64>, Vec<f64>)> = self
            .layers
            .iter()
            .map(|l| (vec![0.0; l.kernel.len()], vec![0.0; l.bias.len()]))
            .collect();
        let mut data_loss = 0.0;
        let mut activity_loss = 0.0;

        for (input, &label) in batch.inputs.iter().zip(&batch.labels) {
            let features = self.features(input)?;
            let trace = self.forward(features, true);
            let p = Self::probability(&trace).clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);
            data_loss -= label * p.ln() + (1.0 - label) * (1.0 - p).ln();

            // dL/dz of the sigmoid output under cross-entropy.
            let mut delta_post: Vec<f64> = Vec::new();
            for (l, layer) in self.layers.iter().enumerate().rev() {
                let post = &trace.post[l];
                let mut delta_z: Vec<f64> = if l + 1 == self.layers.len() {
                    vec![p - label]
                } else {
                    let mask = &trace.masks[l];
                    let mut d = delta_post.clone();
                    if !mask.is_empty() {
                        d.iter_mut().zip(mask).for_each(|(v, m)| *v *= m);
                    }
                    d
                };
                if let Some(r) = layer.regularization.filter(|r| r.l2 > 0.0) {
                    activity_loss += post.iter().map(|a| r.l2 * a * a).sum::<f64>();
                    if l + 1 == self.layers.len() {
                        let a = post[0];
                        delta_z[0] += 2.0 * r.l2 * a * a * (1.0 - a);
                    } else {
                        delta_z.iter_mut().zip(post).for_each(|(d, a)| *d += 2.0 * r.l2 * a);
                    }
                }
                if l + 1 != self.layers.len() {
                    delta_z
                        .iter_mut()
                        .zip(&trace.pre[l])
                        .for_each(|(d, &z)| *d *= layer.activation.derivative(z));
                }

                let input = &trace.inputs[l];
                let (gk, gb) = &mut grads[l];
                for (i, &x) in input.iter().enumerate() {
                    if x == 0.0 {
                        continue;
                    }
                    let row = &mut gk[i * layer.n_out..(i + 1) * layer.n_out];
                    for (g, &d) in row.iter_mut().zip(&delta_z) {
                        *g += x * d;
                    }
                }
                for (g, &d) in gb.iter_mut().zip(&delta_z) {
                    *g += d;
                }

                if l > 0 {
                    delta_post = (0..layer.n_in)
                        .map(|i| {
                            layer.kernel[i * layer.n_out..(i + 1) * layer.n_out]
                                .iter()
                                .zip(&delta_z)
                                .map(|(w, d)| w * d)
                                .sum()
                        })
                        .collect();
                }
            }
        }

        let n = batch.len() as f64;
        for ((gk, gb), layer) in grads.iter_mut().zip(&self.layers) {
            gk.iter_mut().for_each(|g| *g /= n);
            gb.iter_mut().for_each(|g| *g /= n);
            if let Some(r) = layer.regularization {
                for (g, &w) in gk.iter_mut().zip(&layer.kernel) {
                    *g += r.l1 * l1_grad(w) + 2.0 * r.l2 * w;
                }
                for (g, &b) in gb.iter_mut().zip(&layer.bias) {
                    *g += 2.0 * r.l2 * b;
                }
            }
        }
        let penalty: f64 = self.layers.iter().map(DenseLayer::weight_penalty).sum();
        self.apply_adam(&grads);

        Ok((data_loss + activity_loss) / n + penalty)
    }

    fn predict(&self, inputs: &[Vec<f64>]) -> Vec<f64> {
        inputs
            .iter()
            .map(|input| {
                let Ok(mut x) = self.features(input) else {
                    return f64::NAN;
                };
                for layer in &self.layers {
                    x = layer
                        .pre_activation(&x)
                        .into_iter()
                        .map(|z| layer.activation.apply(z))
                        .collect();
                }
                x.first().copied().unwrap_or(f64::NAN)
            })
            .collect()
    }

    fn extractor_name(&self) -> &str {
        self.extractor.name()
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    fn weights(&self) -> Weights {
        Weights {
            layers: self
                .layers
                .iter()
                .map(|l| LayerWeights {
                    n_in: l.n_in,
                    n_out: l.n_out,
                    kernel: l.kernel.clone(),
                    bias: l.bias.clone(),
                })
                .collect(),
        }
    }

    fn set_weights(&mut self, weights: Weights) -> Result<()> {
        let fits = weights.layers.len() == self.layers.len()
            && weights.layers.iter().zip(&self.layers).all(|(w, l)| {
                w.n_in == l.n_in
                    && w.n_out == l.n_out
                    && w.kernel.len() == l.kernel.len()
                    && w.bias.len() == l.bias.len()
            });
        if !fits {
            return Err(Error::Internal("weight shapes do not match the network"));
        }
        for (layer, w) in self.layers.iter_mut().zip(weights.layers) {
            layer.kernel = w.kernel;
            layer.bias = w.bias;
        }
        Ok(())
    }
}
