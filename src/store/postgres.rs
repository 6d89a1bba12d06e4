//! PostgreSQL backend, selected when `DATABASE_URL` is set.
//!
//! Uses the blocking `postgres` client. The client drives its own runtime, so
//! it must be created outside of any async executor and only called from
//! blocking threads (the HTTP layer runs store calls inside `web::block`).

use parking_lot::Mutex;
use postgres::error::SqlState;
use postgres::types::ToSql;
use postgres::{Client, Config, NoTls, Row};

use super::{NewPrediction, PgParams, PredictionRecord, PredictionStore};
use crate::core::errors::{PsError, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS predictions (
    id             BIGSERIAL        PRIMARY KEY,
    observation_id BIGINT           NOT NULL UNIQUE,
    observation    TEXT             NOT NULL,
    proba          DOUBLE PRECISION NOT NULL,
    true_class     BIGINT
);
";

const INSERT: &str = "
INSERT INTO predictions (observation_id, observation, proba)
VALUES ($1, $2, $3)
RETURNING id, observation_id, observation, proba, true_class
";

const UPSERT: &str = "
INSERT INTO predictions (observation_id, observation, proba)
VALUES ($1, $2, $3)
ON CONFLICT (observation_id) DO UPDATE
SET observation = EXCLUDED.observation, proba = EXCLUDED.proba
RETURNING id, observation_id, observation, proba, true_class
";

const ATTACH_OUTCOME: &str = "
UPDATE predictions SET true_class = $2
WHERE observation_id = $1
RETURNING id, observation_id, observation, proba, true_class
";

const SELECT_ONE: &str = "
SELECT id, observation_id, observation, proba, true_class
FROM predictions WHERE observation_id = $1
";

const SELECT_ALL: &str = "
SELECT id, observation_id, observation, proba, true_class
FROM predictions ORDER BY id
";

/// Prediction store over a single PostgreSQL connection.
pub struct PostgresStore {
    client: Mutex<Client>,
}

impl PostgresStore {
    pub fn connect(params: &PgParams) -> Result<Self> {
        let mut config = Config::new();
        config
            .host(&params.host)
            .port(params.port)
            .user(&params.user)
            .dbname(&params.dbname)
            .application_name("predsvc");
        if let Some(password) = &params.password {
            config.password(password);
        }
        let client = config.connect(NoTls)?;
        Ok(Self {
            client: Mutex::new(client),
        })
    }
}

fn is_unique_violation(err: &postgres::Error) -> bool {
    err.code() == Some(&SqlState::UNIQUE_VIOLATION)
}

fn row_params(new: &NewPrediction) -> [&(dyn ToSql + Sync); 3] {
    [&new.observation_id, &new.observation, &new.proba]
}

// A column whose SQL type does not match the record field (for example a
// pre-existing table with INTEGER ids) surfaces as an error, not a panic.
fn map_row(row: &Row) -> Result<PredictionRecord> {
    Ok(PredictionRecord {
        id: row.try_get(0)?,
        observation_id: row.try_get(1)?,
        observation: row.try_get(2)?,
        proba: row.try_get(3)?,
        true_class: row.try_get(4)?,
    })
}

impl PredictionStore for PostgresStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    fn ensure_schema(&self) -> Result<()> {
        self.client.lock().batch_execute(SCHEMA)?;
        Ok(())
    }

    fn insert(&self, new: &NewPrediction) -> Result<PredictionRecord> {
        let mut client = self.client.lock();
        let mut tx = client.transaction()?;
        match tx.query_one(INSERT, &row_params(new)) {
            Ok(row) => {
                let record = map_row(&row)?;
                tx.commit()?;
                Ok(record)
            }
            Err(err) if is_unique_violation(&err) => {
                // The aborted transaction must be cleared before the next statement.
                tx.rollback()?;
                Err(PsError::DuplicateObservation {
                    observation_id: new.observation_id,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn upsert(&self, new: &NewPrediction) -> Result<PredictionRecord> {
        let row = self.client.lock().query_one(UPSERT, &row_params(new))?;
        map_row(&row)
    }

    fn attach_outcome(&self, observation_id: i64, true_class: i64) -> Result<PredictionRecord> {
        let row = self
            .client
            .lock()
            .query_opt(ATTACH_OUTCOME, &[&observation_id, &true_class])?;
        match row {
            Some(row) => map_row(&row),
            None => Err(PsError::ObservationNotFound { observation_id }),
        }
    }

    fn get(&self, observation_id: i64) -> Result<Option<PredictionRecord>> {
        let row = self
            .client
            .lock()
            .query_opt(SELECT_ONE, &[&observation_id])?;
        row.as_ref().map(map_row).transpose()
    }

    fn list(&self) -> Result<Vec<PredictionRecord>> {
        let rows = self.client.lock().query(SELECT_ALL, &[])?;
        rows.iter().map(map_row).collect()
    }
}
