//! Per-trial artifacts: the best-weights checkpoint and the training history.
//!
//! Both live in `<run>/trial_<n>/` as JSON and are replaced atomically: the
//! new content is written to a temporary sibling and renamed over the old one,
//! so a reader never sees a half-written file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::Weights;
use crate::runner::TrainingHistory;

/// Version written into every checkpoint.
pub const FORMAT_VERSION: u32 = 1;

const CHECKPOINT_FILE: &str = "checkpoint.json";
const HISTORY_FILE: &str = "history.json";

/// Best weights of a trial so far.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Layout version of this record.
    pub format_version: u32,
    /// Trial number.
    pub trial: u64,
    /// Epoch (1-based) the weights are from.
    pub epoch: u64,
    /// Monitored metric name.
    pub metric: String,
    /// Monitored metric value at `epoch`.
    pub value: f64,
    /// Frozen extractor the head was trained on.
    pub extractor: String,
    /// Head weights.
    pub weights: Weights,
}

/// Writes `bytes` to `path` through a temporary sibling and a rename.
///
/// # Errors
///
/// [`Error::Io`] if either step fails.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;
    write_atomic(path, &bytes)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{}: {e}", path.display()),
        ))
    })
}

/// The artifact directory of one trial.
#[derive(Clone, Debug)]
pub struct TrialArtifacts {
    dir: PathBuf,
}

impl TrialArtifacts {
    /// Creates `<run_dir>/trial_<trial>` if needed.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the directory cannot be created.
    pub fn create(run_dir: &Path, trial: u64) -> Result<Self> {
        let dir = run_dir.join(format!("trial_{trial}"));
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The trial directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the checkpoint file.
    #[must_use]
    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    /// Path of the history file.
    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    /// Replaces the checkpoint.
    ///
    /// # Errors
    ///
    /// [`Error::Io`].
    pub fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        write_json(&self.checkpoint_path(), checkpoint)?;
        trace_debug!(
            trial = checkpoint.trial,
            epoch = checkpoint.epoch,
            value = checkpoint.value,
            "checkpoint written"
        );
        Ok(())
    }

    /// Reads the checkpoint back.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if it is missing, unreadable, or of an unknown version.
    pub fn load_checkpoint(&self) -> Result<Checkpoint> {
        let checkpoint: Checkpoint = read_json(&self.checkpoint_path())?;
        if checkpoint.format_version != FORMAT_VERSION {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "checkpoint format {} is not supported (expected {FORMAT_VERSION})",
                    checkpoint.format_version
                ),
            )));
        }
        Ok(checkpoint)
    }

    /// Replaces the history file.
    ///
    /// # Errors
    ///
    /// [`Error::Io`].
    pub fn save_history(&self, history: &TrainingHistory) -> Result<()> {
        write_json(&self.history_path(), history)
    }

    /// Reads the history file back.
    ///
    /// # Errors
    ///
    /// [`Error::Io`].
    pub fn load_history(&self) -> Result<TrainingHistory> {
        read_json(&self.history_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LayerWeights;

    fn temp_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("skin_search_{tag}_{nanos}"))
    }

    fn checkpoint(epoch: u64, value: f64) -> Checkpoint {
        Checkpoint {
            format_version: FORMAT_VERSION,
            trial: 4,
            epoch,
            metric: "val_accuracy".into(),
            value,
            extractor: "flatten".into(),
            weights: Weights {
                layers: vec![LayerWeights {
                    n_in: 1,
                    n_out: 1,
                    kernel: vec![value],
                    bias: vec![0.0],
                }],
            },
        }
    }

    #[test]
    fn later_checkpoint_replaces_earlier_one() {
        let run = temp_dir("ckpt");
        let artifacts = TrialArtifacts::create(&run, 4).unwrap();
        artifacts.save_checkpoint(&checkpoint(1, 0.6)).unwrap();
        artifacts.save_checkpoint(&checkpoint(3, 0.7)).unwrap();

        let loaded = artifacts.load_checkpoint().unwrap();
        assert_eq!(loaded, checkpoint(3, 0.7));
        let files: Vec<_> = fs::read_dir(artifacts.dir()).unwrap().collect();
        assert_eq!(files.len(), 1);
        fs::remove_dir_all(&run).unwrap();
    }

    #[test]
    fn unknown_format_version_is_rejected() {
        let run = temp_dir("ckpt_version");
        let artifacts = TrialArtifacts::create(&run, 0).unwrap();
        let mut c = checkpoint(1, 0.5);
        c.format_version = 99;
        artifacts.save_checkpoint(&c).unwrap();
        assert!(matches!(artifacts.load_checkpoint(), Err(Error::Io(_))));
        fs::remove_dir_all(&run).unwrap();
    }
}
