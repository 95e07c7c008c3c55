//! Frozen feature extractors.
//!
//! The extractor sits in front of the trainable head and is never updated.
//! It maps a flat input (see [`data`](crate::data)) to a feature vector.

use crate::data::IMAGE_CHANNELS;

/// A frozen, deterministic mapping from inputs to features.
pub trait FeatureExtractor: Send + Sync {
    /// Short identifier recorded in checkpoints.
    fn name(&self) -> &str;

    /// Length of the input vectors this extractor accepts.
    fn input_dim(&self) -> usize;

    /// Length of the feature vectors it produces.
    fn output_dim(&self) -> usize;

    /// Maps one input to its features.
    fn extract(&self, input: &[f64]) -> Vec<f64>;
}

/// Passes inputs through unchanged.
#[derive(Clone, Debug)]
pub struct Flatten {
    dim: usize,
}

impl Flatten {
    /// An identity extractor over `dim`-long inputs.
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl FeatureExtractor for Flatten {
    fn name(&self) -> &str {
        "flatten"
    }

    fn input_dim(&self) -> usize {
        self.dim
    }

    fn output_dim(&self) -> usize {
        self.dim
    }

    fn extract(&self, input: &[f64]) -> Vec<f64> {
        input.to_vec()
    }
}

/// Average-pools each colour channel over a coarse grid, then appends each
/// channel's standard deviation over the whole image.
///
/// A `rows × cols` grid yields `rows · cols · 3 + 3` features.
#[derive(Clone, Debug)]
pub struct GridPoolExtractor {
    height: usize,
    width: usize,
    rows: usize,
    cols: usize,
}

impl GridPoolExtractor {
    /// Pools `height × width × 3` images over a `rows × cols` grid.
    ///
    /// # Panics
    ///
    /// Panics if the grid is empty or finer than the image.
    #[must_use]
    pub fn new(height: usize, width: usize, rows: usize, cols: usize) -> Self {
        assert!(
            rows > 0 && cols > 0 && rows <= height && cols <= width,
            "grid {rows}x{cols} does not fit a {height}x{width} image"
        );
        Self {
            height,
            width,
            rows,
            cols,
        }
    }
}

/// Pixel range covered by grid cell `index` of `cells` along an axis.
fn cell(index: usize, cells: usize, extent: usize) -> core::ops::Range<usize> {
    (index * extent / cells)..((index + 1) * extent / cells)
}

impl Default for GridPoolExtractor {
    fn default() -> Self {
        Self::new(
            crate::data::IMAGE_HEIGHT as usize,
            crate::data::IMAGE_WIDTH as usize,
            8,
            6,
        )
    }
}

impl FeatureExtractor for GridPoolExtractor {
    fn name(&self) -> &str {
        "grid_pool"
    }

    fn input_dim(&self) -> usize {
        self.height * self.width * IMAGE_CHANNELS
    }

    fn output_dim(&self) -> usize {
        self.rows * self.cols * IMAGE_CHANNELS + IMAGE_CHANNELS
    }

    #[allow(clippy::cast_precision_loss)]
    fn extract(&self, input: &[f64]) -> Vec<f64> {
        let pixel = |y: usize, x: usize, c: usize| {
            input
                .get((y * self.width + x) * IMAGE_CHANNELS + c)
                .copied()
                .unwrap_or(0.0)
        };
        let mut features = Vec::with_capacity(self.output_dim());
        for r in 0..self.rows {
            for q in 0..self.cols {
                let (ys, xs) = (
                    cell(r, self.rows, self.height),
                    cell(q, self.cols, self.width),
                );
                let n = (ys.len() * xs.len()).max(1) as f64;
                for c in 0..IMAGE_CHANNELS {
                    let sum: f64 = ys
                        .clone()
                        .flat_map(|y| xs.clone().map(move |x| (y, x)))
                        .map(|(y, x)| pixel(y, x, c))
                        .sum();
                    features.push(sum / n);
                }
            }
        }
        let n = (self.height * self.width).max(1) as f64;
        for c in 0..IMAGE_CHANNELS {
            let values =
                (0..self.height * self.width).map(|i| pixel(i / self.width, i % self.width, c));
            let mean = values.clone().sum::<f64>() / n;
            let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            features.push(var.sqrt());
        }
        features
    }
}
