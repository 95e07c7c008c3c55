//! Search configuration.
//!
//! A [`SearchConfig`] is read from an optional JSON file, patched with
//! command-line overrides, checked with [`SearchConfig::validate`] and copied
//! into the run directory so every run records what it was started with.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::{IMAGE_HEIGHT, IMAGE_WIDTH, ManifestSplits};
use crate::error::{Error, Result};
use crate::metrics::MonitoredMetric;
use crate::runner::RunnerConfig;
use crate::types::Direction;

/// TPE sampler settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TpeSettings {
    /// Fraction of usable trials treated as good.
    pub gamma: f64,
    /// Usable trials required before the model takes over from random search.
    pub n_startup_trials: usize,
    /// Candidates drawn from the good density per suggestion.
    pub n_ei_candidates: usize,
}

impl Default for TpeSettings {
    fn default() -> Self {
        Self {
            gamma: 0.25,
            n_startup_trials: 10,
            n_ei_candidates: 24,
        }
    }
}

/// Hyperband pruner settings. `max_resource` is the epoch budget.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperbandSettings {
    /// First rung.
    pub min_resource: u64,
    /// Reduction factor (eta).
    pub reduction_factor: u64,
}

impl Default for HyperbandSettings {
    fn default() -> Self {
        Self {
            min_resource: 1,
            reduction_factor: 3,
        }
    }
}

/// Location of the image manifests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Directory with the image files.
    pub image_dir: PathBuf,
    /// Training manifest.
    pub train_csv: PathBuf,
    /// Validation manifest.
    pub validation_csv: PathBuf,
    /// Test manifest.
    pub test_csv: PathBuf,
    /// Negatives kept in the training split.
    pub train_negatives: usize,
    /// Negatives kept in the validation split.
    pub validation_negatives: usize,
    /// Negatives kept in the test split.
    pub test_negatives: usize,
    /// Image height in pixels.
    pub image_height: u32,
    /// Image width in pixels.
    pub image_width: u32,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("data_ham1000/HAM10000_images_part_1"),
            train_csv: PathBuf::from("data_ham1000/train.csv"),
            validation_csv: PathBuf::from("data_ham1000/validation.csv"),
            test_csv: PathBuf::from("data_ham1000/test.csv"),
            train_negatives: 324,
            validation_negatives: 76,
            test_negatives: 184,
            image_height: IMAGE_HEIGHT,
            image_width: IMAGE_WIDTH,
        }
    }
}

impl DataSettings {
    /// Manifest paths and quotas in the form the dataset loader takes.
    #[must_use]
    pub fn manifest_splits(&self) -> ManifestSplits {
        ManifestSplits {
            image_dir: self.image_dir.clone(),
            train_csv: self.train_csv.clone(),
            validation_csv: self.validation_csv.clone(),
            test_csv: self.test_csv.clone(),
            negatives: [
                self.train_negatives,
                self.validation_negatives,
                self.test_negatives,
            ],
        }
    }
}

/// Everything a search run needs besides the data itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Ledger connection string.
    pub storage: String,
    /// Study name.
    pub study_name: String,
    /// Trials to run in this invocation.
    pub n_trials: usize,
    /// Epoch budget per trial.
    pub epochs: u64,
    /// Optimization direction.
    pub direction: Direction,
    /// Objective and monitored metric.
    pub metric: MonitoredMetric,
    /// Early-stopping patience in epochs.
    pub early_stopping_patience: u64,
    /// Plateau patience before learning-rate decay.
    pub lr_patience: u64,
    /// Learning-rate decay factor.
    pub lr_factor: f64,
    /// Minimum improvement for the decay schedule.
    pub lr_min_delta: f64,
    /// Initial learning rate.
    pub learning_rate: f64,
    /// Seed for sampling, shuffling and initialization; random when absent.
    pub seed: Option<u64>,
    /// Sampler settings.
    pub tpe: TpeSettings,
    /// Pruner settings.
    pub hyperband: HyperbandSettings,
    /// Data settings.
    pub data: DataSettings,
    /// Parent of the numbered run directories.
    pub output_root: PathBuf,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            storage: "sqlite:///db.sqlite3".to_string(),
            study_name: "Skin_Problem".to_string(),
            n_trials: 7,
            epochs: 10,
            direction: Direction::Maximize,
            metric: MonitoredMetric::ValAccuracy,
            early_stopping_patience: 3,
            lr_patience: 3,
            lr_factor: 0.5,
            lr_min_delta: 1e-4,
            learning_rate: 1e-3,
            seed: None,
            tpe: TpeSettings::default(),
            hyperband: HyperbandSettings::default(),
            data: DataSettings::default(),
            output_root: PathBuf::from("outputs/search"),
        }
    }
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::Configuration(msg.into())
}

fn in_open_unit(x: f64) -> bool {
    x > 0.0 && x < 1.0
}

impl SearchConfig {
    /// Reads a JSON file; absent fields take their defaults.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the file cannot be read, [`Error::Configuration`] if it
    /// is not valid JSON for this structure.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| invalid(format!("{}: {e}", path.display())))
    }

    /// Writes the configuration as pretty JSON.
    ///
    /// # Errors
    ///
    /// [`Error::Io`].
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| invalid(e.to_string()))?;
        crate::checkpoint::write_atomic(path, &json)
    }

    /// Checks the values for consistency.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.study_name.trim().is_empty() {
            return Err(invalid("study_name must not be empty"));
        }
        if self.n_trials == 0 {
            return Err(invalid("n_trials must be at least 1"));
        }
        if self.epochs == 0 {
            return Err(invalid("epochs must be at least 1"));
        }
        if self.direction != Direction::Maximize {
            return Err(invalid(format!(
                "{} is maximized; direction must be Maximize",
                self.metric
            )));
        }
        if !in_open_unit(self.lr_factor) {
            return Err(invalid(format!(
                "lr_factor must be in (0, 1), got {}",
                self.lr_factor
            )));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(invalid(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.lr_min_delta.is_nan() || self.lr_min_delta < 0.0 {
            return Err(invalid("lr_min_delta must be non-negative"));
        }
        if !in_open_unit(self.tpe.gamma) {
            return Err(invalid(format!(
                "tpe.gamma must be in (0, 1), got {}",
                self.tpe.gamma
            )));
        }
        if self.tpe.n_ei_candidates == 0 {
            return Err(invalid("tpe.n_ei_candidates must be at least 1"));
        }
        if self.hyperband.min_resource == 0 || self.hyperband.min_resource > self.epochs {
            return Err(invalid(format!(
                "hyperband.min_resource must be in [1, epochs], got {}",
                self.hyperband.min_resource
            )));
        }
        if self.hyperband.reduction_factor < 2 {
            return Err(invalid("hyperband.reduction_factor must be at least 2"));
        }
        if self.data.image_height == 0 || self.data.image_width == 0 {
            return Err(invalid("image size must be non-zero"));
        }
        Ok(())
    }

    /// Runner settings derived from this configuration.
    #[must_use]
    pub fn runner(&self) -> RunnerConfig {
        RunnerConfig {
            epochs: self.epochs,
            metric: self.metric,
            early_stopping_patience: self.early_stopping_patience,
            early_stopping_min_delta: 0.0,
            lr_factor: self.lr_factor,
            lr_patience: self.lr_patience,
            lr_min_delta: self.lr_min_delta,
            evaluate_test: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SearchConfig::default();
        config.validate().unwrap();
        assert_eq!(config.n_trials, 7);
        assert_eq!(config.data.manifest_splits().negatives, [324, 76, 184]);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: SearchConfig =
            serde_json::from_str(r#"{"n_trials": 3, "metric": "val_auc", "tpe": {"gamma": 0.3}}"#)
                .unwrap();
        assert_eq!(config.n_trials, 3);
        assert_eq!(config.metric, MonitoredMetric::ValAuc);
        assert!((config.tpe.gamma - 0.3).abs() < 1e-12);
        assert_eq!(config.tpe.n_startup_trials, 10);
        assert_eq!(config.epochs, 10);
    }

    #[test]
    fn validation_names_the_field() {
        let config = SearchConfig {
            epochs: 0,
            ..SearchConfig::default()
        };
        let Err(Error::Configuration(msg)) = config.validate() else {
            panic!("expected a configuration error");
        };
        assert!(msg.contains("epochs"));

        let config = SearchConfig {
            direction: Direction::Minimize,
            ..SearchConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
