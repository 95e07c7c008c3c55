//! `SQLite`-backed ledger for durable, multi-process studies.

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};

use super::{Storage, StudyInfo, check_terminal};
use crate::curve::MetricCurve;
use crate::distribution::Distribution;
use crate::error::{Error, Result};
use crate::hyperparams::HyperparameterConfiguration;
use crate::param::ParamValue;
use crate::trial::TrialRecord;
use crate::types::{Direction, TrialState};

/// Version of the table layout below. Bump on incompatible changes.
const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS schema_info (
    version INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS studies (
    study_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    name      TEXT NOT NULL UNIQUE,
    direction TEXT NOT NULL,
    metric    TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS trials (
    study_id INTEGER NOT NULL REFERENCES studies(study_id),
    number   INTEGER NOT NULL,
    state    TEXT NOT NULL,
    value    REAL,
    PRIMARY KEY (study_id, number)
);
CREATE TABLE IF NOT EXISTS trial_params (
    study_id     INTEGER NOT NULL,
    number       INTEGER NOT NULL,
    position     INTEGER NOT NULL,
    name         TEXT NOT NULL,
    value        TEXT NOT NULL,
    distribution TEXT NOT NULL,
    PRIMARY KEY (study_id, number, name)
);
CREATE TABLE IF NOT EXISTS trial_values (
    study_id INTEGER NOT NULL,
    number   INTEGER NOT NULL,
    step     INTEGER NOT NULL,
    value    REAL NOT NULL,
    PRIMARY KEY (study_id, number, step)
);
";

/// A ledger stored in a `SQLite` database.
///
/// WAL mode allows concurrent readers alongside one writer, and a busy
/// timeout makes writers from other processes wait instead of failing.
/// Trial numbers are assigned inside `IMMEDIATE` transactions, so two
/// processes sharing a file never hand out the same number.
///
/// Parameter values and distributions are stored as JSON text.
///
/// # Examples
///
/// ```no_run
/// use skin_search::storage::SqliteStorage;
///
/// let ledger = SqliteStorage::open("sqlite:///db.sqlite3").unwrap();
/// # let _ = ledger;
/// ```
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens a ledger from `sqlite:///relative.db`, `sqlite:////absolute.db`
    /// or a bare path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the database cannot be opened.
    pub fn open(url: &str) -> Result<Self> {
        Self::new(url.strip_prefix("sqlite:///").unwrap_or(url))
    }

    /// Opens (creating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the database cannot be opened, the schema
    /// cannot be created, or the file was written by an incompatible version.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(30))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        trace_debug!(journal_mode = %mode, "opened sqlite ledger");

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute_batch(SCHEMA)?;
        let version: Option<i64> = tx
            .query_row("SELECT version FROM schema_info LIMIT 1", [], |row| row.get(0))
            .optional()?;
        match version {
            None => {
                tx.execute("INSERT INTO schema_info (version) VALUES (?1)", [SCHEMA_VERSION])?;
            }
            Some(v) if v == SCHEMA_VERSION => {}
            Some(v) => {
                return Err(Error::Storage(format!(
                    "ledger schema version {v} is not supported (expected {SCHEMA_VERSION})"
                )));
            }
        }
        tx.commit()?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn to_i64(n: u64) -> Result<i64> {
    i64::try_from(n).map_err(|_| Error::Storage(format!("{n} does not fit the ledger")))
}

fn to_u64(n: i64) -> Result<u64> {
    u64::try_from(n).map_err(|_| Error::Storage(format!("negative number {n} in the ledger")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Storage(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| Error::Storage(e.to_string()))
}

fn parse_state(s: &str) -> Result<TrialState> {
    TrialState::parse(s).ok_or_else(|| Error::Storage(format!("unknown trial state '{s}'")))
}

/// Fails unless the trial exists and is still RUNNING.
fn ensure_running(tx: &Transaction<'_>, study_id: i64, number: u64) -> Result<()> {
    let state: Option<String> = tx
        .query_row(
            "SELECT state FROM trials WHERE study_id = ?1 AND number = ?2",
            params![study_id, to_i64(number)?],
            |row| row.get(0),
        )
        .optional()?;
    match state.as_deref().map(parse_state).transpose()? {
        Some(TrialState::Running) => Ok(()),
        Some(_) => Err(Error::TrialAlreadyFinished(number)),
        None => Err(Error::Storage(format!("unknown trial {number}"))),
    }
}

fn read_study(conn: &Connection, name: &str) -> Result<Option<StudyInfo>> {
    let row: Option<(i64, String, String)> = conn
        .query_row(
            "SELECT study_id, direction, metric FROM studies WHERE name = ?1",
            [name],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    row.map(|(id, direction, metric)| {
        let direction = Direction::parse(&direction)
            .ok_or_else(|| Error::Storage(format!("unknown direction '{direction}'")))?;
        Ok(StudyInfo {
            id,
            name: name.to_string(),
            direction,
            metric,
        })
    })
    .transpose()
}

impl Storage for SqliteStorage {
    fn open_study(&self, name: &str, direction: Direction, metric: &str) -> Result<StudyInfo> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Some(existing) = read_study(&tx, name)? {
            existing.ensure_matches(direction, metric)?;
            return Ok(existing);
        }
        tx.execute(
            "INSERT INTO studies (name, direction, metric) VALUES (?1, ?2, ?3)",
            params![name, direction.as_str(), metric],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(StudyInfo {
            id,
            name: name.to_string(),
            direction,
            metric: metric.to_string(),
        })
    }

    fn load_study(&self, name: &str) -> Result<Option<StudyInfo>> {
        read_study(&self.conn.lock(), name)
    }

    fn create_trial(&self, study_id: i64) -> Result<u64> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let next: i64 = tx.query_row(
            "SELECT COALESCE(MAX(number) + 1, 0) FROM trials WHERE study_id = ?1",
            [study_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO trials (study_id, number, state, value) VALUES (?1, ?2, ?3, NULL)",
            params![study_id, next, TrialState::Running.as_str()],
        )?;
        tx.commit()?;
        to_u64(next)
    }

    fn set_trial_param(
        &self,
        study_id: i64,
        number: u64,
        name: &str,
        value: &ParamValue,
        distribution: &Distribution,
    ) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_running(&tx, study_id, number)?;
        let number = to_i64(number)?;
        let position: i64 = tx.query_row(
            "SELECT COUNT(*) FROM trial_params WHERE study_id = ?1 AND number = ?2",
            params![study_id, number],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO trial_params (study_id, number, position, name, value, distribution)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                study_id,
                number,
                position,
                name,
                to_json(value)?,
                to_json(distribution)?
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn report_intermediate(
        &self,
        study_id: i64,
        number: u64,
        step: u64,
        value: f64,
    ) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_running(&tx, study_id, number)?;
        tx.execute(
            "INSERT INTO trial_values (study_id, number, step, value) VALUES (?1, ?2, ?3, ?4)",
            params![study_id, to_i64(number)?, to_i64(step)?, value],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn finish_trial(
        &self,
        study_id: i64,
        number: u64,
        state: TrialState,
        value: Option<f64>,
    ) -> Result<()> {
        check_terminal(state)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_running(&tx, study_id, number)?;
        tx.execute(
            "UPDATE trials SET state = ?1, value = ?2
             WHERE study_id = ?3 AND number = ?4 AND state = 'RUNNING'",
            params![state.as_str(), value, study_id, to_i64(number)?],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn trials(&self, study_id: i64) -> Result<Vec<TrialRecord>> {
        let mut conn = self.conn.lock();
        // One read transaction, so the three queries see the same snapshot
        // while other processes keep writing.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let records = read_trials(&tx, study_id)?;
        tx.commit()?;
        Ok(records)
    }
}

fn read_trials(conn: &Connection, study_id: i64) -> Result<Vec<TrialRecord>> {
    let mut stmt = conn.prepare(
        "SELECT number, state, value FROM trials WHERE study_id = ?1 ORDER BY number",
    )?;
    let rows = stmt.query_map([study_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<f64>>(2)?,
        ))
    })?;
    let mut records = Vec::new();
    for row in rows {
        let (number, state, value) = row?;
        records.push(TrialRecord {
            number: to_u64(number)?,
            state: parse_state(&state)?,
            value,
            params: HyperparameterConfiguration::new(),
            intermediate_values: MetricCurve::new(),
        });
    }

    let mut stmt = conn.prepare(
        "SELECT number, name, value, distribution FROM trial_params
         WHERE study_id = ?1 ORDER BY number, position",
    )?;
    let rows = stmt.query_map([study_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;
    for row in rows {
        let (number, name, value, distribution) = row?;
        let number = to_u64(number)?;
        if let Some(record) = records.iter_mut().find(|r| r.number == number) {
            record
                .params
                .insert(&name, from_json(&value)?, from_json(&distribution)?);
        }
    }

    let mut stmt = conn.prepare(
        "SELECT number, step, value FROM trial_values
         WHERE study_id = ?1 ORDER BY number, step",
    )?;
    let rows = stmt.query_map([study_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, f64>(2)?,
        ))
    })?;
    let mut curves: Vec<Vec<(u64, f64)>> = vec![Vec::new(); records.len()];
    for row in rows {
        let (number, step, value) = row?;
        let number = to_u64(number)?;
        if let Some(i) = records.iter().position(|r| r.number == number) {
            curves[i].push((to_u64(step)?, value));
        }
    }
    for (record, points) in records.iter_mut().zip(curves) {
        record.intermediate_values = MetricCurve::from_points(points);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::IntDistribution;

    #[test]
    fn in_memory_database_round_trips_a_trial() {
        let s = SqliteStorage::new(":memory:").unwrap();
        let study = s.open_study("skin", Direction::Maximize, "val_accuracy").unwrap();
        let n = s.create_trial(study.id).unwrap();
        let dist = Distribution::Int(IntDistribution { low: 1, high: 15 });
        s.set_trial_param(study.id, n, "batch_size", &ParamValue::Int(7), &dist)
            .unwrap();
        s.set_trial_param(study.id, n, "regul", &ParamValue::Bool(true), &dist)
            .unwrap();
        s.report_intermediate(study.id, n, 1, 0.61).unwrap();
        s.report_intermediate(study.id, n, 2, 0.66).unwrap();
        s.finish_trial(study.id, n, TrialState::Complete, Some(0.66))
            .unwrap();

        let trials = s.trials(study.id).unwrap();
        assert_eq!(trials.len(), 1);
        let t = &trials[0];
        assert_eq!(t.state, TrialState::Complete);
        assert_eq!(t.value, Some(0.66));
        let names: Vec<_> = t.params.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["batch_size", "regul"]);
        assert_eq!(t.intermediate_values.as_slice(), &[(1, 0.61), (2, 0.66)]);
    }

    #[test]
    fn finish_twice_fails() {
        let s = SqliteStorage::new(":memory:").unwrap();
        let study = s.open_study("skin", Direction::Maximize, "val_accuracy").unwrap();
        let n = s.create_trial(study.id).unwrap();
        s.finish_trial(study.id, n, TrialState::Pruned, None).unwrap();
        assert!(matches!(
            s.finish_trial(study.id, n, TrialState::Complete, Some(1.0)),
            Err(Error::TrialAlreadyFinished(0))
        ));
    }

    #[test]
    fn url_prefix_is_stripped() {
        assert!(SqliteStorage::open("sqlite:///:memory:").is_ok());
    }
}
