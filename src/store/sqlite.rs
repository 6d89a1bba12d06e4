//! Embedded SQLite backend.

use std::fs;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use super::{NewPrediction, PredictionRecord, PredictionStore};
use crate::core::errors::{PsError, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS predictions (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    observation_id INTEGER NOT NULL UNIQUE,
    observation    TEXT    NOT NULL,
    proba          REAL    NOT NULL,
    true_class     INTEGER
);
";

const SELECT_COLUMNS: &str =
    "SELECT id, observation_id, observation, proba, true_class FROM predictions";

/// Prediction store over a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file, creating parent directories as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| PsError::io(parent, source))?;
        }
        let conn = Connection::open(path)?;
        apply_pragmas(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, used by tests and `score`.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA busy_timeout = 5000;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        ",
    )?;
    Ok(())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<PredictionRecord> {
    Ok(PredictionRecord {
        id: row.get(0)?,
        observation_id: row.get(1)?,
        observation: row.get(2)?,
        proba: row.get(3)?,
        true_class: row.get(4)?,
    })
}

fn select_by_observation(
    conn: &Connection,
    observation_id: i64,
) -> Result<Option<PredictionRecord>> {
    let sql = format!("{SELECT_COLUMNS} WHERE observation_id = ?1");
    Ok(conn
        .query_row(&sql, params![observation_id], map_row)
        .optional()?)
}

fn require(record: Option<PredictionRecord>, observation_id: i64) -> Result<PredictionRecord> {
    record.ok_or(PsError::ObservationNotFound { observation_id })
}

impl PredictionStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn ensure_schema(&self) -> Result<()> {
        self.conn.lock().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn insert(&self, new: &NewPrediction) -> Result<PredictionRecord> {
        // BEGIN IMMEDIATE: competing connections wait on busy_timeout rather
        // than failing on a stale snapshot.
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
            "INSERT INTO predictions (observation_id, observation, proba) VALUES (?1, ?2, ?3)",
            params![new.observation_id, new.observation, new.proba],
        );
        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                tx.rollback()?;
                return Err(PsError::DuplicateObservation {
                    observation_id: new.observation_id,
                });
            }
            Err(err) => return Err(err.into()),
        }
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(PredictionRecord {
            id,
            observation_id: new.observation_id,
            observation: new.observation.clone(),
            proba: new.proba,
            true_class: None,
        })
    }

    fn upsert(&self, new: &NewPrediction) -> Result<PredictionRecord> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO predictions (observation_id, observation, proba) VALUES (?1, ?2, ?3)
             ON CONFLICT(observation_id) DO UPDATE
             SET observation = excluded.observation, proba = excluded.proba",
            params![new.observation_id, new.observation, new.proba],
        )?;
        let stored = select_by_observation(&tx, new.observation_id)?;
        let record = require(stored, new.observation_id)?;
        tx.commit()?;
        Ok(record)
    }

    fn attach_outcome(&self, observation_id: i64, true_class: i64) -> Result<PredictionRecord> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE predictions SET true_class = ?2 WHERE observation_id = ?1",
            params![observation_id, true_class],
        )?;
        if changed == 0 {
            return Err(PsError::ObservationNotFound { observation_id });
        }
        let record = require(select_by_observation(&tx, observation_id)?, observation_id)?;
        tx.commit()?;
        Ok(record)
    }

    fn get(&self, observation_id: i64) -> Result<Option<PredictionRecord>> {
        select_by_observation(&self.conn.lock(), observation_id)
    }

    fn list(&self) -> Result<Vec<PredictionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id"))?;
        let rows = stmt.query_map([], map_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteStore;
    use crate::store::{NewPrediction, PredictionStore};

    fn store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().expect("open");
        store.ensure_schema().expect("schema");
        store
    }

    #[test]
    fn ensure_schema_is_idempotent() {
        let store = store();
        store.ensure_schema().expect("second call");
        assert!(store.list().expect("list").is_empty());
    }

    #[test]
    fn insert_assigns_surrogate_ids() {
        let store = store();
        let a = store.insert(&NewPrediction::new(10, "{}", 0.2)).expect("a");
        let b = store.insert(&NewPrediction::new(11, "{}", 0.7)).expect("b");
        assert!(b.id > a.id);
        assert_eq!(a.true_class, None);
    }

    #[test]
    fn duplicate_insert_is_refused_and_row_kept() {
        let store = store();
        store
            .insert(&NewPrediction::new(1, r#"{"Age":22}"#, 0.25))
            .expect("first");
        let err = store
            .insert(&NewPrediction::new(1, r#"{"Age":80}"#, 0.9))
            .expect_err("duplicate");
        assert_eq!(err.code(), "PS-2001");

        let kept = store.get(1).expect("get").expect("row");
        assert_eq!(kept.observation, r#"{"Age":22}"#);
        assert!((kept.proba - 0.25).abs() < f64::EPSILON);

        // The connection is usable after the rollback.
        store
            .insert(&NewPrediction::new(2, "{}", 0.5))
            .expect("next insert");
        assert_eq!(store.list().expect("list").len(), 2);
    }

    #[test]
    fn upsert_overwrites_but_keeps_outcome() {
        let store = store();
        let first = store
            .upsert(&NewPrediction::new(5, "{}", 0.1))
            .expect("first");
        store.attach_outcome(5, 1).expect("outcome");
        let second = store
            .upsert(&NewPrediction::new(5, r#"{"x":1}"#, 0.8))
            .expect("second");
        assert_eq!(first.id, second.id);
        assert_eq!(second.observation, r#"{"x":1}"#);
        assert!((second.proba - 0.8).abs() < f64::EPSILON);
        assert_eq!(second.true_class, Some(1));
        assert_eq!(store.list().expect("list").len(), 1);
    }

    #[test]
    fn attach_outcome_on_unknown_id_creates_nothing() {
        let store = store();
        let err = store.attach_outcome(99, 1).expect_err("missing");
        assert_eq!(err.code(), "PS-2002");
        assert!(store.get(99).expect("get").is_none());
    }

    #[test]
    fn attach_outcome_can_be_repeated() {
        let store = store();
        store
            .insert(&NewPrediction::new(3, "{}", 0.4))
            .expect("insert");
        let first = store.attach_outcome(3, 1).expect("first");
        assert_eq!(first.true_class, Some(1));
        let second = store.attach_outcome(3, 0).expect("second");
        assert_eq!(second.true_class, Some(0));
    }

    #[test]
    fn file_backed_rows_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("predictions.db");
        {
            let store = SqliteStore::open(&path).expect("open");
            store.ensure_schema().expect("schema");
            store
                .insert(&NewPrediction::new(7, "{}", 0.3))
                .expect("insert");
        }
        let reopened = SqliteStore::open(&path).expect("reopen");
        reopened.ensure_schema().expect("schema");
        let row = reopened.get(7).expect("get").expect("row");
        assert_eq!(row.observation_id, 7);
    }
}
