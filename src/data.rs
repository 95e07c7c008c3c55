//! Dataset providers: restartable batched train, validation and test splits.
//!
//! A [`DatasetProvider`] hands out a fresh batch iterator every time
//! [`batches`](DatasetProvider::batches) is called, so the runner can make one
//! pass per epoch. Inputs are flat `f64` vectors; for images they are
//! `height × width × 3` pixels rescaled to `[0, 1]`, row-major, channel last.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Image height fed to the extractor.
pub const IMAGE_HEIGHT: u32 = 240;
/// Image width fed to the extractor.
pub const IMAGE_WIDTH: u32 = 180;
/// Colour channels per pixel.
pub const IMAGE_CHANNELS: usize = 3;

/// Which part of the data a batch comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Split {
    /// Used for weight updates.
    Train,
    /// Used for the monitored metric and the objective.
    Validation,
    /// Sanity check after training; never used for selection.
    Test,
}

impl core::fmt::Display for Split {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Split::Train => "train",
            Split::Validation => "validation",
            Split::Test => "test",
        })
    }
}

/// One labelled input.
#[derive(Clone, Debug, PartialEq)]
pub struct Example {
    /// Flat input vector.
    pub input: Vec<f64>,
    /// Binary label, `0.0` or `1.0`.
    pub label: f64,
}

impl Example {
    /// Creates a labelled example.
    #[must_use]
    pub fn new(input: Vec<f64>, label: f64) -> Self {
        Self { input, label }
    }
}

/// A mini-batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    /// Inputs, one per example.
    pub inputs: Vec<Vec<f64>>,
    /// Labels aligned with `inputs`.
    pub labels: Vec<f64>,
}

impl Batch {
    /// Number of examples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns `true` if the batch holds no examples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn push(&mut self, example: Example) {
        self.inputs.push(example.input);
        self.labels.push(example.label);
    }
}

/// Boxed batch iterator returned by providers.
pub type BatchIter<'a> = Box<dyn Iterator<Item = Result<Batch>> + 'a>;

/// Source of batched examples for the three splits.
pub trait DatasetProvider: Send + Sync {
    /// Number of examples in `split`.
    fn len(&self, split: Split) -> usize;

    /// Returns `true` if `split` holds no examples.
    fn is_empty(&self, split: Split) -> bool {
        self.len(split) == 0
    }

    /// Starts a new pass over `split` in batches of `batch_size`.
    ///
    /// The last batch may be smaller. Calling this again restarts the pass.
    ///
    /// # Errors
    ///
    /// [`Error::DataProvider`] if the pass cannot start; individual batches may
    /// also fail while iterating.
    fn batches(&self, split: Split, batch_size: usize) -> Result<BatchIter<'_>>;
}

fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(Error::DataProvider("batch size must be at least 1".into()));
    }
    Ok(())
}

/// Fisher-Yates shuffle of indices `0..n`.
fn shuffled_indices(n: usize, rng: &mut fastrand::Rng) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    rng.shuffle(&mut order);
    order
}

/// Examples held in memory.
///
/// The training split is reshuffled on every pass; validation and test keep
/// their order.
pub struct InMemoryDataset {
    train: Vec<Example>,
    validation: Vec<Example>,
    test: Vec<Example>,
    rng: Mutex<fastrand::Rng>,
}

impl InMemoryDataset {
    /// Creates a dataset from three splits.
    #[must_use]
    pub fn new(train: Vec<Example>, validation: Vec<Example>, test: Vec<Example>) -> Self {
        Self {
            train,
            validation,
            test,
            rng: Mutex::new(fastrand::Rng::new()),
        }
    }

    /// Seeds the training-split shuffle.
    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::with_seed(seed)),
            ..self
        }
    }

    fn split(&self, split: Split) -> &[Example] {
        match split {
            Split::Train => &self.train,
            Split::Validation => &self.validation,
            Split::Test => &self.test,
        }
    }
}

impl DatasetProvider for InMemoryDataset {
    fn len(&self, split: Split) -> usize {
        self.split(split).len()
    }

    fn batches(&self, split: Split, batch_size: usize) -> Result<BatchIter<'_>> {
        check_batch_size(batch_size)?;
        let examples = self.split(split);
        let order = if split == Split::Train {
            shuffled_indices(examples.len(), &mut self.rng.lock())
        } else {
            (0..examples.len()).collect()
        };
        let batches: Vec<Vec<usize>> = order.chunks(batch_size).map(<[usize]>::to_vec).collect();
        Ok(Box::new(batches.into_iter().map(move |chunk| {
            let mut batch = Batch::default();
            for i in chunk {
                batch.push(examples[i].clone());
            }
            Ok(batch)
        })))
    }
}

/// One row of a manifest: an image file name and its label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestEntry {
    /// File name relative to the image directory.
    pub image_name: String,
    /// Target column, `"0"` or `"1"`.
    pub target: String,
}

impl ManifestEntry {
    fn is_negative(&self) -> bool {
        self.target == "0"
    }

    fn is_positive(&self) -> bool {
        self.target == "1"
    }
}

/// Reads a CSV manifest with `image_name` and `target` columns.
///
/// # Errors
///
/// [`Error::DataProvider`] if the file cannot be read, a column is missing, or
/// a target is neither `0` nor `1`.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestEntry>> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| Error::DataProvider(format!("{}: {e}", path.display())))?;
    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers.iter().position(|h| h == name).ok_or_else(|| {
            Error::DataProvider(format!("{}: missing column '{name}'", path.display()))
        })
    };
    let (name_idx, target_idx) = (column("image_name")?, column("target")?);

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record?;
        let entry = ManifestEntry {
            image_name: record.get(name_idx).unwrap_or_default().to_string(),
            target: record.get(target_idx).unwrap_or_default().trim().to_string(),
        };
        if !entry.is_negative() && !entry.is_positive() {
            return Err(Error::DataProvider(format!(
                "{}: target for '{}' must be 0 or 1, got '{}'",
                path.display(),
                entry.image_name,
                entry.target
            )));
        }
        entries.push(entry);
    }
    Ok(entries)
}

/// Down-samples the negative class.
///
/// Shuffles, keeps the first `n_negatives` negatives and every positive, then
/// shuffles again. Fewer negatives than requested keeps them all.
#[must_use]
pub fn balance_negatives(
    entries: &[ManifestEntry],
    n_negatives: usize,
    rng: &mut fastrand::Rng,
) -> Vec<ManifestEntry> {
    let mut shuffled = entries.to_vec();
    rng.shuffle(&mut shuffled);
    let mut kept: Vec<ManifestEntry> = shuffled
        .iter()
        .filter(|e| e.is_negative())
        .take(n_negatives)
        .cloned()
        .collect();
    kept.extend(shuffled.into_iter().filter(ManifestEntry::is_positive));
    rng.shuffle(&mut kept);
    kept
}

/// Loads an image, resizes it to `height × width` and rescales it to `[0, 1]`.
///
/// # Errors
///
/// [`Error::DataProvider`] if the file cannot be opened or decoded.
pub fn load_image(path: &Path, height: u32, width: u32) -> Result<Vec<f64>> {
    let img = image::open(path)
        .map_err(|e| Error::DataProvider(format!("{}: {e}", path.display())))?;
    let resized = img
        .resize_exact(width, height, image::imageops::FilterType::Triangle)
        .to_rgb8();
    Ok(resized
        .pixels()
        .flat_map(|p| p.0)
        .map(|c| f64::from(c) / 255.0)
        .collect())
}

/// Per-split manifest paths and negative-class quotas.
#[derive(Clone, Debug)]
pub struct ManifestSplits {
    /// Directory holding the image files.
    pub image_dir: PathBuf,
    /// Training manifest.
    pub train_csv: PathBuf,
    /// Validation manifest.
    pub validation_csv: PathBuf,
    /// Test manifest.
    pub test_csv: PathBuf,
    /// Negatives kept per split: train, validation, test.
    pub negatives: [usize; 3],
}

/// Images listed in CSV manifests, decoded lazily batch by batch.
pub struct ManifestDataset {
    image_dir: PathBuf,
    splits: [Vec<ManifestEntry>; 3],
    height: u32,
    width: u32,
    rng: Mutex<fastrand::Rng>,
}

impl ManifestDataset {
    /// Reads the three manifests and down-samples their negatives.
    ///
    /// # Errors
    ///
    /// Errors from [`read_manifest`].
    pub fn open(config: &ManifestSplits, seed: Option<u64>) -> Result<Self> {
        let mut rng = seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
        let mut load = |path: &Path, quota: usize| -> Result<Vec<ManifestEntry>> {
            Ok(balance_negatives(&read_manifest(path)?, quota, &mut rng))
        };
        let train = load(&config.train_csv, config.negatives[0])?;
        let validation = load(&config.validation_csv, config.negatives[1])?;
        let test = load(&config.test_csv, config.negatives[2])?;
        trace_info!(
            train = train.len(),
            validation = validation.len(),
            test = test.len(),
            "manifests loaded"
        );
        Ok(Self {
            image_dir: config.image_dir.clone(),
            splits: [train, validation, test],
            height: IMAGE_HEIGHT,
            width: IMAGE_WIDTH,
            rng: Mutex::new(rng),
        })
    }

    /// Overrides the decoded image size.
    #[must_use]
    pub fn with_image_size(mut self, height: u32, width: u32) -> Self {
        self.height = height;
        self.width = width;
        self
    }

    fn entries(&self, split: Split) -> &[ManifestEntry] {
        match split {
            Split::Train => &self.splits[0],
            Split::Validation => &self.splits[1],
            Split::Test => &self.splits[2],
        }
    }

    fn image_path(&self, name: &str) -> PathBuf {
        let path = self.image_dir.join(name);
        if path.extension().is_none() && !path.exists() {
            return path.with_extension("jpg");
        }
        path
    }

    fn load(&self, entry: &ManifestEntry) -> Result<Example> {
        let input = load_image(&self.image_path(&entry.image_name), self.height, self.width)?;
        let label = if entry.is_positive() { 1.0 } else { 0.0 };
        Ok(Example::new(input, label))
    }
}

impl DatasetProvider for ManifestDataset {
    fn len(&self, split: Split) -> usize {
        self.entries(split).len()
    }

    fn batches(&self, split: Split, batch_size: usize) -> Result<BatchIter<'_>> {
        check_batch_size(batch_size)?;
        let entries = self.entries(split);
        let order = shuffled_indices(entries.len(), &mut self.rng.lock());
        let chunks: Vec<Vec<usize>> = order.chunks(batch_size).map(<[usize]>::to_vec).collect();
        Ok(Box::new(chunks.into_iter().map(move |chunk| {
            let mut batch = Batch::default();
            for i in chunk {
                batch.push(self.load(&entries[i])?);
            }
            Ok(batch)
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(neg: usize, pos: usize) -> Vec<ManifestEntry> {
        (0..neg)
            .map(|i| ManifestEntry {
                image_name: format!("n{i}"),
                target: "0".into(),
            })
            .chain((0..pos).map(|i| ManifestEntry {
                image_name: format!("p{i}"),
                target: "1".into(),
            }))
            .collect()
    }

    #[test]
    fn balance_keeps_quota_and_all_positives() {
        let mut rng = fastrand::Rng::with_seed(7);
        let kept = balance_negatives(&entries(500, 40), 324, &mut rng);
        assert_eq!(kept.iter().filter(|e| e.target == "0").count(), 324);
        assert_eq!(kept.iter().filter(|e| e.target == "1").count(), 40);
    }

    #[test]
    fn balance_with_too_few_negatives_keeps_them_all() {
        let mut rng = fastrand::Rng::with_seed(7);
        let kept = balance_negatives(&entries(10, 5), 76, &mut rng);
        assert_eq!(kept.len(), 15);
    }

    #[test]
    fn in_memory_batches_cover_split_and_restart() {
        let train: Vec<Example> = (0..7)
            .map(|i| Example::new(vec![f64::from(i)], f64::from(i % 2)))
            .collect();
        let ds = InMemoryDataset::new(train, Vec::new(), Vec::new()).with_seed(1);
        for _ in 0..2 {
            let sizes: Vec<usize> = ds
                .batches(Split::Train, 3)
                .unwrap()
                .map(|b| b.unwrap().len())
                .collect();
            assert_eq!(sizes, vec![3, 3, 1]);
        }
        assert!(ds.batches(Split::Train, 0).is_err());
        assert!(ds.is_empty(Split::Test));
    }

    #[test]
    fn manifest_requires_columns_and_binary_targets() {
        let dir = std::env::temp_dir().join(format!(
            "skin_search_manifest_{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let good = dir.join("good.csv");
        std::fs::write(&good, "image_name,target\nISIC_1,0\nISIC_2,1\n").unwrap();
        assert_eq!(read_manifest(&good).unwrap().len(), 2);

        let bad = dir.join("bad.csv");
        std::fs::write(&bad, "image_name,target\nISIC_1,2\n").unwrap();
        assert!(matches!(read_manifest(&bad), Err(Error::DataProvider(_))));

        let missing = dir.join("missing.csv");
        std::fs::write(&missing, "name,label\nISIC_1,0\n").unwrap();
        assert!(matches!(read_manifest(&missing), Err(Error::DataProvider(_))));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
