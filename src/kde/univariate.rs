//! Gaussian kernel density estimation over one parameter.

use crate::rng_util;

/// A Gaussian kernel density estimator.
///
/// TPE fits one of these to the "good" observations (l(x)) and one to the
/// "bad" observations (g(x)) of a numeric parameter, in the sampler's internal
/// (possibly log-transformed) space.
#[derive(Clone, Debug)]
pub(crate) struct KernelDensityEstimator {
    samples: Vec<f64>,
    bandwidth: f64,
}

impl KernelDensityEstimator {
    /// Fits a KDE with Scott's rule, floored at `min_bandwidth`.
    ///
    /// Returns `None` if `samples` is empty.
    pub(crate) fn fit(samples: Vec<f64>, min_bandwidth: f64) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let bandwidth = scotts_rule(&samples).max(min_bandwidth);
        Some(Self { samples, bandwidth })
    }

    /// Probability density at `x`: the mean of the kernels centered on each sample.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn pdf(&self, x: f64) -> f64 {
        let inv_h = 1.0 / self.bandwidth;
        let norm = inv_h / (2.0 * core::f64::consts::PI).sqrt();
        let density: f64 = self
            .samples
            .iter()
            .map(|&xi| {
                let z = (x - xi) * inv_h;
                norm * (-0.5 * z * z).exp()
            })
            .sum();
        density / self.samples.len() as f64
    }

    /// Picks a kernel uniformly and perturbs its center by one bandwidth of noise.
    pub(crate) fn sample(&self, rng: &mut fastrand::Rng) -> f64 {
        let center = self.samples[rng.usize(..self.samples.len())];
        center + rng_util::standard_normal(rng) * self.bandwidth
    }

    #[cfg(test)]
    pub(crate) fn bandwidth(&self) -> f64 {
        self.bandwidth
    }
}

/// h = n^(-1/5) * sigma. Identical samples yield zero and rely on the floor.
#[allow(clippy::cast_precision_loss)]
fn scotts_rule(samples: &[f64]) -> f64 {
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    n.powf(-0.2) * var.sqrt()
}
