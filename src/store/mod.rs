//! Prediction record store: one table keyed by a unique observation id, backed
//! by SQLite locally or PostgreSQL when a connection string is configured.
//!
//! Duplicate ids and unknown ids are reported as explicit error variants
//! ([`PsError::DuplicateObservation`], [`PsError::ObservationNotFound`]) so the
//! HTTP layer decides the response shape.
//!
//! [`PsError::DuplicateObservation`]: crate::core::errors::PsError::DuplicateObservation
//! [`PsError::ObservationNotFound`]: crate::core::errors::PsError::ObservationNotFound

pub mod backend;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod record;
pub mod sqlite;

use std::sync::Arc;

use crate::core::config::DuplicatePolicy;
use crate::core::errors::Result;

pub use backend::{BackendDescriptor, PgParams};
pub use record::{NewPrediction, PredictionRecord};

/// Storage operations required by the endpoint layer.
pub trait PredictionStore: Send + Sync {
    /// Short backend label for logs and `/health`.
    fn backend_name(&self) -> &'static str;

    /// Create the predictions table if it does not exist yet.
    fn ensure_schema(&self) -> Result<()>;

    /// Strict insert. A second row for the same observation id is refused with
    /// `DuplicateObservation` and the failed write is rolled back.
    fn insert(&self, new: &NewPrediction) -> Result<PredictionRecord>;

    /// Insert, or replace `observation` and `proba` of the existing row.
    /// `true_class` is left as it was.
    fn upsert(&self, new: &NewPrediction) -> Result<PredictionRecord>;

    /// Set the ground-truth label of an existing row. Never creates a row.
    fn attach_outcome(&self, observation_id: i64, true_class: i64) -> Result<PredictionRecord>;

    fn get(&self, observation_id: i64) -> Result<Option<PredictionRecord>>;

    /// All rows ordered by surrogate id.
    fn list(&self) -> Result<Vec<PredictionRecord>>;
}

/// Record a prediction following the configured duplicate-id policy.
pub fn record_prediction(
    store: &dyn PredictionStore,
    policy: DuplicatePolicy,
    new: &NewPrediction,
) -> Result<PredictionRecord> {
    match policy {
        DuplicatePolicy::Reject => store.insert(new),
        DuplicatePolicy::Overwrite => store.upsert(new),
    }
}

/// Connect to the selected backend and make sure the schema exists.
pub fn open(backend: &BackendDescriptor) -> Result<Arc<dyn PredictionStore>> {
    let store: Arc<dyn PredictionStore> = match backend {
        BackendDescriptor::Embedded { path } => Arc::new(sqlite::SqliteStore::open(path)?),
        #[cfg(feature = "postgres")]
        BackendDescriptor::Networked(params) => {
            Arc::new(self::postgres::PostgresStore::connect(params)?)
        }
        #[cfg(not(feature = "postgres"))]
        BackendDescriptor::Networked(_) => {
            return Err(crate::core::errors::PsError::InvalidConfig {
                details: "DATABASE_URL is set but this build lacks the \"postgres\" feature"
                    .to_string(),
            });
        }
    };
    store.ensure_schema()?;
    log::info!("prediction store ready: {backend}");
    Ok(store)
}
