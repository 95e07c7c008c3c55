//! The run directory of one search invocation.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Output location of a single run: `<root>/id_<n>/` with the first free `n`
/// starting at 1.
///
/// Claiming the directory uses `create_dir`, so two processes started at the
/// same time never share one.
#[derive(Clone, Debug)]
pub struct RunContext {
    id: u64,
    dir: PathBuf,
}

impl RunContext {
    /// Claims the next free run directory under `root`.
    ///
    /// # Errors
    ///
    /// [`Error::Io`](crate::Error::Io) if `root` cannot be created or a run
    /// directory cannot be claimed.
    pub fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        let mut id = 1;
        loop {
            let dir = root.join(format!("id_{id}"));
            match fs::create_dir(&dir) {
                Ok(()) => {
                    trace_info!(dir = %dir.display(), "run directory created");
                    return Ok(Self { id, dir });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => id += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Run number.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The run directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the plain-text best-trial summary.
    #[must_use]
    pub fn best_trial_path(&self) -> PathBuf {
        self.dir.join("best_trial.txt")
    }

    /// Path of the HTML report.
    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        self.dir.join("report.html")
    }

    /// Path of the copied search configuration.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.dir.join("search_config.json")
    }
}
