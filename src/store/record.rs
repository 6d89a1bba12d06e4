//! Persisted prediction rows.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

/// One recorded prediction, as returned by `/update` and `/list-db-contents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Backend-assigned surrogate key.
    pub id: i64,
    pub observation_id: i64,
    /// Serialized JSON of the observation exactly as it was scored.
    pub observation: String,
    pub proba: f64,
    pub true_class: Option<i64>,
}

/// Fields supplied by `/predict` when recording a new prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPrediction {
    pub observation_id: i64,
    pub observation: String,
    pub proba: f64,
}

impl NewPrediction {
    #[must_use]
    pub fn new(observation_id: i64, observation: impl Into<String>, proba: f64) -> Self {
        Self {
            observation_id,
            observation: observation.into(),
            proba,
        }
    }
}
