//! Integration tests for the SQLite study ledger.

use std::sync::Arc;

use skin_search::storage::{SqliteStorage, Storage};
use skin_search::{Direction, Error, Study, TrialState};

fn temp_path() -> std::path::PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!(
        "skin_search_ledger_test_{}.db",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    path
}

fn cleanup(path: &std::path::Path) {
    std::fs::remove_file(path).ok();
    for suffix in ["-wal", "-shm"] {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        std::fs::remove_file(side).ok();
    }
}

fn open(path: &std::path::Path, metric: &str) -> skin_search::Result<Study> {
    Study::builder()
        .name("Skin_Problem")
        .maximize()
        .metric(metric)
        .storage(SqliteStorage::new(path)?)
        .build()
}

#[test]
fn trials_survive_a_restart() {
    let path = temp_path();
    {
        let study = open(&path, "val_accuracy").unwrap();
        let mut t = study.create_trial().unwrap();
        t.suggest_int("batch_size", 1, 15).unwrap();
        t.report(1, 0.7).unwrap();
        t.report(2, 0.8).unwrap();
        study.complete_trial(t, 0.8).unwrap();

        let t = study.create_trial().unwrap();
        study.prune_trial(t).unwrap();
    }

    let study = open(&path, "val_accuracy").unwrap();
    let trials = study.trials().unwrap();
    assert_eq!(trials.len(), 2);
    assert_eq!(trials[0].state, TrialState::Complete);
    assert_eq!(trials[0].value, Some(0.8));
    assert_eq!(trials[0].intermediate_values.len(), 2);
    assert!(trials[0].params.int("batch_size").is_ok());
    assert_eq!(trials[1].state, TrialState::Pruned);

    // numbering continues where the previous process stopped
    let t = study.create_trial().unwrap();
    assert_eq!(t.number(), 2);
    study.fail_trial(t, "interrupted").unwrap();

    cleanup(&path);
}

#[test]
fn reopening_with_another_metric_is_rejected() {
    let path = temp_path();
    drop(open(&path, "val_accuracy").unwrap());
    assert!(matches!(
        open(&path, "val_auc"),
        Err(Error::MetricMismatch { .. })
    ));
    cleanup(&path);
}

#[test]
fn reopening_with_another_direction_is_rejected() {
    let path = temp_path();
    drop(open(&path, "val_accuracy").unwrap());
    let err = Study::builder()
        .name("Skin_Problem")
        .direction(Direction::Minimize)
        .metric("val_accuracy")
        .storage(SqliteStorage::new(&path).unwrap())
        .build();
    assert!(matches!(err, Err(Error::DirectionMismatch { .. })));
    cleanup(&path);
}

#[test]
fn two_handles_share_one_file() {
    let path = temp_path();
    let a: Arc<dyn Storage> = Arc::new(SqliteStorage::new(&path).unwrap());
    let b: Arc<dyn Storage> = Arc::new(SqliteStorage::new(&path).unwrap());
    let info = a
        .open_study("shared", Direction::Maximize, "val_accuracy")
        .unwrap();
    let info_b = b
        .open_study("shared", Direction::Maximize, "val_accuracy")
        .unwrap();
    assert_eq!(info.id, info_b.id);

    let numbers: Vec<u64> = (0..6)
        .map(|i| {
            let s = if i % 2 == 0 { &a } else { &b };
            s.create_trial(info.id).unwrap()
        })
        .collect();
    assert_eq!(numbers, [0, 1, 2, 3, 4, 5]);

    a.finish_trial(info.id, 3, TrialState::Complete, Some(0.9))
        .unwrap();
    assert!(matches!(
        b.finish_trial(info.id, 3, TrialState::Failed, None),
        Err(Error::TrialAlreadyFinished(3))
    ));
    cleanup(&path);
}

#[test]
fn loading_a_missing_study_fails() {
    let path = temp_path();
    let result = Study::builder()
        .name("nope")
        .storage(SqliteStorage::new(&path).unwrap())
        .load();
    assert!(matches!(result, Err(Error::Storage(_))));
    cleanup(&path);
}

#[test]
fn reads_see_committed_rows_while_another_writer_is_open() {
    let path = temp_path();
    let storage = SqliteStorage::new(&path).unwrap();
    let info = storage
        .open_study("snapshot", Direction::Maximize, "val_accuracy")
        .unwrap();
    let first = storage.create_trial(info.id).unwrap();
    storage.report_intermediate(info.id, first, 1, 0.5).unwrap();

    let writer = rusqlite::Connection::open(&path).unwrap();
    writer.execute_batch("BEGIN IMMEDIATE").unwrap();
    writer
        .execute(
            "INSERT INTO trials (study_id, number, state, value) VALUES (?1, 1, 'RUNNING', NULL)",
            [info.id],
        )
        .unwrap();
    writer
        .execute(
            "INSERT INTO trial_values (study_id, number, step, value) VALUES (?1, 1, 1, 0.7)",
            [info.id],
        )
        .unwrap();

    let trials = storage.trials(info.id).unwrap();
    assert_eq!(trials.len(), 1);
    assert_eq!(trials[0].intermediate_values.len(), 1);

    writer.execute_batch("COMMIT").unwrap();
    let trials = storage.trials(info.id).unwrap();
    assert_eq!(trials.len(), 2);
    assert_eq!(trials[1].number, 1);
    assert_eq!(trials[1].intermediate_values.len(), 1);
    drop(writer);
    cleanup(&path);
}
