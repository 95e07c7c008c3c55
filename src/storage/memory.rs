use parking_lot::RwLock;

use super::{Storage, StudyInfo, check_terminal};
use crate::curve::MetricCurve;
use crate::distribution::Distribution;
use crate::error::{Error, Result};
use crate::hyperparams::HyperparameterConfiguration;
use crate::param::ParamValue;
use crate::trial::TrialRecord;
use crate::types::{Direction, TrialState};

struct StudyEntry {
    info: StudyInfo,
    trials: Vec<TrialRecord>,
}

/// In-memory ledger.
///
/// Nothing survives the process; useful for tests and dry runs.
#[derive(Default)]
pub struct MemoryStorage {
    studies: RwLock<Vec<StudyEntry>>,
}

impl MemoryStorage {
    /// Creates a new, empty in-memory ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn study_mut(studies: &mut [StudyEntry], study_id: i64) -> Result<&mut StudyEntry> {
    studies
        .iter_mut()
        .find(|s| s.info.id == study_id)
        .ok_or_else(|| Error::Storage(format!("unknown study id {study_id}")))
}

fn running_trial(
    studies: &mut [StudyEntry],
    study_id: i64,
    number: u64,
) -> Result<&mut TrialRecord> {
    let trial = study_mut(studies, study_id)?
        .trials
        .iter_mut()
        .find(|t| t.number == number)
        .ok_or_else(|| Error::Storage(format!("unknown trial {number}")))?;
    if trial.state.is_finished() {
        return Err(Error::TrialAlreadyFinished(number));
    }
    Ok(trial)
}

impl Storage for MemoryStorage {
    fn open_study(&self, name: &str, direction: Direction, metric: &str) -> Result<StudyInfo> {
        let mut studies = self.studies.write();
        if let Some(existing) = studies.iter().find(|s| s.info.name == name) {
            existing.info.ensure_matches(direction, metric)?;
            return Ok(existing.info.clone());
        }
        let info = StudyInfo {
            id: i64::try_from(studies.len())
                .map_err(|_| Error::Storage("too many studies".into()))?,
            name: name.to_string(),
            direction,
            metric: metric.to_string(),
        };
        studies.push(StudyEntry {
            info: info.clone(),
            trials: Vec::new(),
        });
        Ok(info)
    }

    fn load_study(&self, name: &str) -> Result<Option<StudyInfo>> {
        Ok(self
            .studies
            .read()
            .iter()
            .find(|s| s.info.name == name)
            .map(|s| s.info.clone()))
    }

    fn create_trial(&self, study_id: i64) -> Result<u64> {
        let mut studies = self.studies.write();
        let study = study_mut(&mut studies, study_id)?;
        let number = study.trials.len() as u64;
        study.trials.push(TrialRecord {
            number,
            state: TrialState::Running,
            value: None,
            params: HyperparameterConfiguration::new(),
            intermediate_values: MetricCurve::new(),
        });
        Ok(number)
    }

    fn set_trial_param(
        &self,
        study_id: i64,
        number: u64,
        name: &str,
        value: &ParamValue,
        distribution: &Distribution,
    ) -> Result<()> {
        let mut studies = self.studies.write();
        let trial = running_trial(&mut studies, study_id, number)?;
        trial.params.insert(name, value.clone(), distribution.clone());
        Ok(())
    }

    fn report_intermediate(
        &self,
        study_id: i64,
        number: u64,
        step: u64,
        value: f64,
    ) -> Result<()> {
        let mut studies = self.studies.write();
        let trial = running_trial(&mut studies, study_id, number)?;
        trial.intermediate_values.push(step, value)
    }

    fn finish_trial(
        &self,
        study_id: i64,
        number: u64,
        state: TrialState,
        value: Option<f64>,
    ) -> Result<()> {
        check_terminal(state)?;
        let mut studies = self.studies.write();
        let trial = running_trial(&mut studies, study_id, number)?;
        trial.state = state;
        trial.value = value;
        Ok(())
    }

    fn trials(&self, study_id: i64) -> Result<Vec<TrialRecord>> {
        self.studies
            .read()
            .iter()
            .find(|s| s.info.id == study_id)
            .map(|s| s.trials.clone())
            .ok_or_else(|| Error::Storage(format!("unknown study id {study_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_are_sequential() {
        let s = MemoryStorage::new();
        let study = s.open_study("a", Direction::Maximize, "val_accuracy").unwrap();
        assert_eq!(s.create_trial(study.id).unwrap(), 0);
        assert_eq!(s.create_trial(study.id).unwrap(), 1);
        assert_eq!(s.trials(study.id).unwrap().len(), 2);
    }

    #[test]
    fn double_finalization_is_rejected() {
        let s = MemoryStorage::new();
        let study = s.open_study("a", Direction::Maximize, "val_accuracy").unwrap();
        let n = s.create_trial(study.id).unwrap();
        s.finish_trial(study.id, n, TrialState::Complete, Some(0.8)).unwrap();
        assert!(matches!(
            s.finish_trial(study.id, n, TrialState::Failed, None),
            Err(Error::TrialAlreadyFinished(0))
        ));
        assert!(matches!(
            s.report_intermediate(study.id, n, 1, 0.5),
            Err(Error::TrialAlreadyFinished(0))
        ));
    }

    #[test]
    fn reopen_checks_identity() {
        let s = MemoryStorage::new();
        s.open_study("a", Direction::Maximize, "val_accuracy").unwrap();
        assert!(s.open_study("a", Direction::Maximize, "val_accuracy").is_ok());
        assert!(matches!(
            s.open_study("a", Direction::Maximize, "val_auc"),
            Err(Error::MetricMismatch { .. })
        ));
        assert!(matches!(
            s.open_study("a", Direction::Minimize, "val_accuracy"),
            Err(Error::DirectionMismatch { .. })
        ));
    }
}
